#![cfg_attr(feature = "failfast", allow(unreachable_code))]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

mod buf_pair;
mod context;
mod error;
mod fetch;
mod json_ext;
mod pool;
mod resolver;
mod shape;
mod variables;

pub use buf_pair::*;
pub use context::*;
pub use error::*;
pub use fetch::*;
pub use json_ext::*;
pub use resolver::*;
pub use shape::*;
pub use variables::*;

pub mod prelude {
    pub mod graphql {
        pub use crate::*;
    }
}
