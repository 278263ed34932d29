/// Engine constants

// Receipt polling
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

// Join authorizations stay valid for an hour unless configured otherwise
pub const DEFAULT_JOIN_SIGNATURE_TTL_SECS: u64 = 3_600;

// Gas limit = ceil(estimate * GAS_LIMIT_NUMERATOR / GAS_LIMIT_DENOMINATOR)
pub const GAS_LIMIT_NUMERATOR: u64 = 6;
pub const GAS_LIMIT_DENOMINATOR: u64 = 5;

// maxFeePerGas = baseFee + PRIORITY_FEE_MULTIPLIER * priorityFee
pub const PRIORITY_FEE_MULTIPLIER: u64 = 2;

// Typed-data domain defaults
pub const DEFAULT_EIP712_NAME: &str = "MortalCoin";
pub const DEFAULT_EIP712_VERSION: &str = "1";

// Canonical contract signatures (no whitespace, exact parameter types)
pub const SIG_CREATE_GAME: &str = "createGame(address)";
pub const SIG_JOIN_GAME: &str = "joinGame(uint256,address,uint256,bytes)";
pub const SIG_POST_POSITION: &str = "postPosition(uint256,bytes32,bytes)";
pub const SIG_CLOSE_POSITION: &str = "closePosition(uint256,uint8,uint256)";
pub const SIG_FINISH_GAME: &str = "finishGame(uint256,uint8,uint256)";
pub const SIG_FORCE_FINISH_GAME: &str = "forceFinishGame(uint256,uint8,uint256,uint8,uint256)";

pub const EVENT_POSITION_CLOSED: &str =
    "PositionClosed(uint256,address,address,uint256,uint256,uint8,int256)";
pub const EVENT_GAME_CREATED: &str = "GameCreated(uint256,address,uint256,address)";

// Bundled contract ABI, used when no ABI path is configured
pub const DEFAULT_ABI_JSON: &str = include_str!("../abi/mortalcoin.json");
