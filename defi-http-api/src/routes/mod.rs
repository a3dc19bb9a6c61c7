pub mod agent;
pub mod automation;
pub mod health;
pub mod popups;
pub mod profile;
pub mod session;
pub mod wallets;
