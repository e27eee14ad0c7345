pub mod error;
pub mod types;

pub use error::{CloneError, ErrorKind, Result};
pub use types::{
    AppId, ApplicationView, CellId, CloneCell, CloneCellRef, CloneId, CloneIndex, CloneState,
    Modifiers, RoleName, RoleView,
};
