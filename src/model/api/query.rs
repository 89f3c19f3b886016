use rocket::FromForm;

use crate::model::lifecycle::Lifecycle;

/// Query string of listing endpoints. `?isDeleted` (or `?isDeleted=true`)
/// lists deleted entities instead of live ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromForm)]
pub struct ListQuery {
    #[field(name = "isDeleted", default = false)]
    pub is_deleted: bool,
}

impl ListQuery {
    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_deleted(self.is_deleted)
    }
}
