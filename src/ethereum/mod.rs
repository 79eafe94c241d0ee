//! EVM adapter: definition lookup, proxy detection, ABI codec and RPC access.

pub mod abi;
pub mod codec;
pub mod contract;
pub mod provider;
pub mod proxy;
pub mod resolver;
pub mod schema;
pub mod utils;
