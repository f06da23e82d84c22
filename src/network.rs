//! Bitcoin network context for previewing and signing transactions.

use std::fmt;
use std::str::FromStr;

use bech32::Hrp;
use serde::{Deserialize, Serialize};

/// Network a transaction payload is interpreted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Some(Self::Mainnet),
            "testnet" | "test" | "testnet3" => Some(Self::Testnet),
            "signet" => Some(Self::Signet),
            "regtest" => Some(Self::Regtest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Signet => "signet",
            Self::Regtest => "regtest",
        }
    }

    /// Human-readable part for segwit addresses.
    pub fn bech32_hrp(self) -> Hrp {
        match self {
            Self::Mainnet => bech32::hrp::BC,
            Self::Testnet | Self::Signet => bech32::hrp::TB,
            Self::Regtest => bech32::hrp::BCRT,
        }
    }

    pub fn p2pkh_prefix(self) -> u8 {
        match self {
            Self::Mainnet => 0x00,
            _ => 0x6f,
        }
    }

    pub fn p2sh_prefix(self) -> u8 {
        match self {
            Self::Mainnet => 0x05,
            _ => 0xc4,
        }
    }

    /// BIP-32 extended public key version bytes (`xpub` / `tpub`).
    pub fn xpub_version(self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0x04, 0x88, 0xb2, 0x1e],
            _ => [0x04, 0x35, 0x87, 0xcf],
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("expected 'mainnet', 'testnet', 'signet' or 'regtest', got '{s}'")
        })
    }
}
