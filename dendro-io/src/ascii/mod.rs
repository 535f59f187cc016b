mod format;
pub use self::format::*;

mod reader;
pub use self::reader::*;

mod writer;
pub use self::writer::*;
