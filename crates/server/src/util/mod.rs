pub mod dates;
pub mod mask;
pub mod pagination;
pub mod password;
