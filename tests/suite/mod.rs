mod battery;
mod config;
mod consistency;
mod remote;
