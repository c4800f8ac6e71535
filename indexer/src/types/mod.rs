mod cell;
mod event;
mod release;

pub use cell::{Cell, Row};
pub use event::{ChangeEvent, OperationKind, RowChange};
pub use release::{DELETED_STATUS, ReleaseColumns, ReleaseId, ReleaseRecord};
