pub mod claude;
pub mod error;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use error::{AiError, Result};
pub use traits::TextModel;
