#![forbid(unsafe_code)]

pub mod draft;
pub mod patch;
pub mod record;
pub mod schema;
pub mod status;

pub use draft::{Draft, RelationTarget};
pub use patch::{Patch, PatchError, PatchOp, column_path};
pub use record::Record;
pub use schema::{
    EntitySchema, EntityType, EntityTypeError, FieldDef, FieldKind, RegistryError, SchemaCheck,
    SchemaRegistry, SchemaViolation,
};
pub use status::ChangeStatus;
