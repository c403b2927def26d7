pub mod capability_flags;
pub mod column_type;
pub mod status_flags;

pub use capability_flags::CapabilityFlags;
pub use column_type::ColumnType;
pub use status_flags::StatusFlags;
