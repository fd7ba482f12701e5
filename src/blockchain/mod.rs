pub mod abi;
pub mod decoder;
pub mod ethereum;
pub mod etherscan;
pub mod traits;

pub use decoder::LogDecoder;
pub use ethereum::EthereumClient;
pub use etherscan::EtherscanClient;
pub use traits::{ChainReader, EventDecoder, Verification, VerificationSource};
