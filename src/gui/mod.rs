//! Terminal user interface pieces shared by the binaries.

pub mod error;
pub mod fold_until_stop;
pub mod list_selector;
pub mod plot_view;

pub use error::RangingGuiError;
pub use fold_until_stop::fold_until_stop;
pub use list_selector::list_selector;
