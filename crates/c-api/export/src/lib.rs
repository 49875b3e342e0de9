pub use hftok_c_api::*;
