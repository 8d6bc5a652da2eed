mod account;

pub use account::NetAppAccount;
