pub mod archive;
pub mod descriptor;
pub mod layout;
pub mod scanner;
