pub mod record;
pub mod summary;
pub mod symptom;

pub use record::*;
pub use summary::*;
pub use symptom::*;
