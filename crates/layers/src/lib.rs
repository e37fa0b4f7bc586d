pub mod overlay;
pub mod projection;
pub mod svg;
pub mod symbology;

pub use overlay::*;
pub use projection::*;
pub use symbology::*;
