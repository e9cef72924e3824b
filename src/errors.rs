use thiserror::Error;

/// Flat set of failure kinds surfaced to the operator. Workers collapse
/// every internal failure into one of these before it crosses the
/// worker/UI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("region already exists")]
    DuplicateRegion,
    #[error("cannot remove the last region")]
    LastRegion,
    #[error("connection of this type already exists")]
    DuplicateConnection,
    #[error("cannot connect a terminal to itself")]
    SelfConnection,
    #[error("terminals belong to different regions")]
    CrossRegionConnection,
    #[error("no origin or destination terminal")]
    NoOriginOrDestination,
    #[error("no connections between terminals")]
    NoConnections,
    #[error("no path found")]
    PathNotFound,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("server reset failed")]
    ResetFailed,
    #[error("cancelled")]
    Cancelled,
    #[error("invalid coordinate")]
    InvalidCoordinate,
    #[error("invalid configuration")]
    InvalidConfig,
}

/// Where the UI shows an error of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSurface {
    /// Modal dialog.
    Dialog,
    /// Transient status bar message.
    StatusBar,
    /// Sticky red message in the backend message area.
    BackendArea,
    /// Not shown; the value is clamped or substituted.
    Silent,
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct PlanError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PlanError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        PlanError {
            kind,
            message: message.into(),
        }
    }

    pub fn service_unavailable(service: impl std::fmt::Display) -> Self {
        PlanError::new(
            ErrorKind::ServiceUnavailable,
            format!("no response from {}", service),
        )
    }

    pub fn cancelled() -> Self {
        PlanError::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn surface(&self) -> ErrorSurface {
        use ErrorKind::*;
        match self.kind {
            DuplicateRegion | LastRegion | InvalidConfig => ErrorSurface::Dialog,
            DuplicateConnection | SelfConnection | CrossRegionConnection
            | NoOriginOrDestination | NoConnections | PathNotFound | Cancelled => {
                ErrorSurface::StatusBar
            }
            ServiceUnavailable | ResetFailed => ErrorSurface::BackendArea,
            InvalidCoordinate => ErrorSurface::Silent,
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces() {
        let e = PlanError::new(ErrorKind::DuplicateRegion, "Region 1");
        assert_eq!(e.surface(), ErrorSurface::Dialog);
        let e = PlanError::service_unavailable("NeTrainSim");
        assert_eq!(e.surface(), ErrorSurface::BackendArea);
        assert!(e.to_string().contains("NeTrainSim"));
        let e = PlanError::new(ErrorKind::InvalidCoordinate, "nan");
        assert_eq!(e.surface(), ErrorSurface::Silent);
    }
}
