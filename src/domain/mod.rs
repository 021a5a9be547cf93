pub mod amount;
pub mod session;
pub mod transaction;

pub use amount::*;
pub use session::*;
pub use transaction::*;
