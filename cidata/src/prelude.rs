#![allow(unused_imports)]

pub use crate::backend::*;
pub use crate::config::*;
pub use crate::constants::*;
pub use crate::core::directory_record::*;
pub use crate::core::path_table::*;
pub use crate::core::rock_ridge::*;
pub use crate::core::short_name::*;
pub use crate::core::volume_descriptor::*;
pub use crate::file_system::*;
pub use crate::image_builder::*;
pub use crate::memory_backend::*;
pub use crate::pool_lock::*;
pub use crate::reconstruct::*;
pub use crate::resource_key::*;
pub use crate::seed::*;
pub use crate::seed_errors::*;
pub use crate::transfer::*;
pub use crate::utils::*;
