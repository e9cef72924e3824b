//! Single-shot background task that projects the edited graph into the
//! terminal-graph service and retrieves the top-K paths between the
//! unique Origin and Destination terminals.

use crate::app::BackgroundJobs;
use crate::backend::terminal_graph::{ModeFilter, PathRecord, TerminalGraphService};
use crate::document::projection::{self, ProjectionOutput};
use crate::document::Document;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;

#[derive(Debug)]
pub enum PathfindMsg {
    ResultReady(Vec<PathRecord>),
    Error(PlanError),
}

/// Immutable snapshot handed to the worker; the worker never touches
/// scene state.
#[derive(Clone, Debug)]
pub struct PathfindJob {
    pub projection: ProjectionOutput,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub k: usize,
}

/// Build the worker input on the UI thread.
pub fn snapshot(doc: &Document, k: usize) -> PathfindJob {
    PathfindJob {
        projection: projection::project(doc),
        origin: doc.origin().map(|(id, _)| id),
        destination: doc.destination().map(|(id, _)| id),
        k: k.max(1),
    }
}

fn check_cancel(cancel: &AtomicBool, service: &dyn TerminalGraphService) -> PlanResult<()> {
    if cancel.load(Ordering::SeqCst) {
        // cancellation before the query leaves the service reset-clean
        let _ = service.reset_server();
        return Err(PlanError::cancelled());
    }
    Ok(())
}

/// The staged pipeline. Stages are strictly ordered; any failure
/// replaces the result.
pub fn run(
    job: &PathfindJob,
    service: &dyn TerminalGraphService,
    cancel: &AtomicBool,
) -> PlanResult<Vec<PathRecord>> {
    // 1. reset
    if !service.reset_server()? {
        return Err(PlanError::new(
            ErrorKind::ResetFailed,
            "terminal-graph server rejected the reset",
        ));
    }
    check_cancel(cancel, service)?;

    // 2. unique origin and destination
    let (src, dst) = match (&job.origin, &job.destination) {
        (Some(src), Some(dst)) => (src.clone(), dst.clone()),
        _ => {
            return Err(PlanError::new(
                ErrorKind::NoOriginOrDestination,
                "place one Origin and one Destination terminal first",
            ))
        }
    };

    // 3. project the graph onto the server
    let added = projection::emit(&job.projection, service)?;
    check_cancel(cancel, service)?;

    // 4. nothing to route over
    if added == 0 {
        return Err(PlanError::new(
            ErrorKind::NoConnections,
            "no connection lines between terminals",
        ));
    }

    // 5. both endpoints actually made it to the server
    for id in &[&src, &dst] {
        if !service.get_terminal_status(id)? {
            return Err(PlanError::new(
                ErrorKind::NoOriginOrDestination,
                format!("terminal {} was dropped by the server", id),
            ));
        }
    }
    check_cancel(cancel, service)?;

    // 6. ranked paths, any mode, dwell included
    let paths = service.find_top_paths(&src, &dst, job.k, ModeFilter::Any, false)?;
    if cancel.load(Ordering::SeqCst) {
        // after the query no partial list is returned
        return Err(PlanError::cancelled());
    }

    // 7. result
    if paths.is_empty() {
        return Err(PlanError::new(
            ErrorKind::PathNotFound,
            format!("no path from {} to {}", src, dst),
        ));
    }
    info!("path finding produced {} of {} requested paths", paths.len(), job.k);
    Ok(paths)
}

/// Run the pipeline off the UI thread; the result arrives on the
/// returned channel.
pub fn spawn(
    bg: &mut BackgroundJobs,
    job: PathfindJob,
    service: Arc<dyn TerminalGraphService>,
    cancel: Arc<AtomicBool>,
) -> Receiver<PathfindMsg> {
    let (tx, rx) = channel();
    bg.execute(move || {
        let msg = match run(&job, service.as_ref(), &cancel) {
            Ok(paths) => PathfindMsg::ResultReady(paths),
            Err(e) => PathfindMsg::Error(e),
        };
        if tx.send(msg).is_err() {
            debug!("path finding finished after its receiver was dropped");
        }
    });
    rx
}
