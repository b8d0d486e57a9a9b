pub mod reconciler;
pub mod view;

pub use reconciler::{MessageReconciler, Reconciled};
pub use view::{HistoryStatus, RoomView};
