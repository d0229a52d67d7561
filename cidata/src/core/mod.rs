pub mod directory_record;
pub mod path_table;
pub mod rock_ridge;
pub mod short_name;
pub mod volume_descriptor;
