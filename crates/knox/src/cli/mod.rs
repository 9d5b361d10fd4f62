pub mod args;
pub mod op;
pub mod ops;

pub use ops::{
    Access, Acl, Add, Create, Daemon, Deactivate, Delete, Get, KeyTemplates, Keys, Login,
    Promote, Reactivate, Register, Unregister, Versions,
};
