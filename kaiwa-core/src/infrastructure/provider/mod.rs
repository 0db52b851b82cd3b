// 补全提供商适配器

mod mock;
mod openai;

pub use mock::*;
pub use openai::*;
