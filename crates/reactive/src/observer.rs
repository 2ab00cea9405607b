//! Observer interface of a live result.

use vellum_core::Model;

use crate::controller::LiveResultController;

/// Receives notice when a controller's materialized list is replaced.
///
/// The controller holds its observer weakly. Both hooks run while the
/// controller is mutably borrowed, so they may read it through the reference
/// they receive but must not re-enter it through its `Rc<RefCell<_>>`.
/// Mutating the store from `did_change` is allowed: the resulting events are
/// queued and applied once the current event is done.
pub trait ResultObserver<T: Model> {
    /// Called immediately before the materialized list is replaced.
    fn will_change(&self, _controller: &LiveResultController<T>) {}

    /// Called immediately after the materialized list is replaced.
    fn did_change(&self, _controller: &LiveResultController<T>) {}
}
