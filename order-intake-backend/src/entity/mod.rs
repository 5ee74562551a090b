pub mod attached_file;
pub mod order;

pub use attached_file::Entity as AttachedFile;
pub use order::Entity as Order;
