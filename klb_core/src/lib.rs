pub mod codec;
pub mod container;
pub mod geometry;
pub mod header;
pub mod queue;
pub mod reader;
pub mod roi;
pub mod status;
pub mod writer;

pub use codec::Codec;
pub use header::{CompressionType, DataType, Header, DIMS, METADATA_SIZE};
pub use reader::{read_full, read_header, read_roi, ReadOptions};
pub use roi::Roi;
pub use status::{status_code, Status};
pub use writer::{write, write_slices, WriteOptions};
