pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const DEFAULT_DIFFICULTY: u32 = 2;
pub const DEFAULT_MINING_REWARD: f64 = 100.0;
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 10;
pub const REWARD_SENDER: &str = "MINING_REWARD";
pub const GENESIS_DATA: &str = "Genesis Block - The beginning of BlockSim";
/// 2024-01-01T00:00:00Z
pub const GENESIS_TIMESTAMP: f64 = 1_704_067_200.0;
