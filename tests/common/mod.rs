#![allow(dead_code)]

mod mock_board;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use boardcom::{Address, Board, RawRepl, Settings, SettingsBuilder};
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};

pub use mock_board::{Device, MockBoard, Node, PasteSupport};

/// Settings for the simulated board: no pacing, short timeouts.
pub fn settings() -> SettingsBuilder {
    let _ = SimpleLogger::init(LevelFilter::Debug, Config::default());
    SettingsBuilder::new()
        .address("mock")
        .write_pause(Duration::from_millis(0))
        .read_timeout(Duration::from_millis(300))
}

pub fn repl(settings: &Settings) -> (RawRepl, Arc<Mutex<Device>>) {
    let (transport, device) = MockBoard::new();
    (RawRepl::new(Box::new(transport), settings), device)
}

pub fn board(settings: Settings) -> (Board, Arc<Mutex<Device>>) {
    let (transport, device) = MockBoard::new();
    let board = Board::with_transport(
        Box::new(transport),
        Address::Serial("mock".into()),
        settings,
    );
    (board, device)
}

pub fn device(device: &Arc<Mutex<Device>>) -> MutexGuard<'_, Device> {
    device.lock().unwrap()
}
