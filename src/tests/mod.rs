// Test modules for GH Chat
// Each module holds the tests of the corresponding source module

mod support;

mod channel_tests;
mod session_tests;
mod tui_tests;
