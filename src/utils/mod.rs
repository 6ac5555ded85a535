pub mod coordinate_error;
pub mod location;
pub mod reader;
pub mod sync;
pub mod writer;
