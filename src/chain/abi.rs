//! Contract bindings.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface IDiceGame {
        function MIN_BET() external view returns (uint256);
        function getMaxBet() external view returns (uint256);
        function getBankBalance() external view returns (uint256);
        function play(uint256 amount, uint8 choice, uint256 clientSeed) external;

        event Played(address indexed player, uint256 amount, uint8 choice, uint8 result, bool won);
    }
}

sol! {
    #[sol(rpc)]
    interface ISwap {
        function getMonReserve() external view returns (uint256);
        function getVinReserve() external view returns (uint256);
        function swapMonForVin() external payable;
        function swapVinForMon(uint256 vinAmount) external;
    }
}
