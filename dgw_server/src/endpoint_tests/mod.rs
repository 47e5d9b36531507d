mod admin;
mod evm;
mod helpers;
mod orders;
mod webhooks;
