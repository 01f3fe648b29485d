pub mod bilibili;
pub mod mock_bilibili;
