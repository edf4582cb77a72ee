mod common;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use assert2::{assert, let_assert};
use boardcom::{Error, ReplMode};

use common::{device, PasteSupport};

#[test]
fn enter_raw_mode_with_soft_reboot() {
    let settings = common::settings().raw_paste(false).finalize();
    let (mut repl, board) = common::repl(&settings);
    assert!(repl.mode() == ReplMode::Unknown);

    repl.enter_raw_repl().unwrap();
    assert!(repl.mode() == ReplMode::Raw);
    assert!(device(&board).raw_entries == 1);
    assert!(device(&board).soft_reboots == 1);
}

#[test]
fn enter_raw_mode_without_soft_reboot() {
    let settings = common::settings().soft_reset(false).finalize();
    let (mut repl, board) = common::repl(&settings);

    repl.enter_raw_repl().unwrap();
    assert!(repl.mode().is_raw());
    assert!(device(&board).soft_reboots == 0);

    // The prompt left behind belongs to the first submission.
    device(&board).script("print(1)", b"1\r\n", b"");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
}

#[test]
fn exec_collects_both_streams() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).script("print('hi')\nraise ValueError", b"hi\r\n", b"ValueError:\r\n");

    repl.enter_raw_repl().unwrap();
    let output = repl.exec_raw("print('hi')\nraise ValueError").unwrap();
    assert!(output.stdout == b"hi\r\n");
    assert!(output.stderr == b"ValueError:\r\n");
    assert!(repl.mode().is_raw());
}

#[test]
fn remote_exceptions_are_kept_verbatim() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    let traceback = b"Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\nZeroDivisionError: divide by zero\r\n";
    device(&board).script("print('a')\n1/0", b"a\r\n", traceback);

    repl.enter_raw_repl().unwrap();
    let_assert!(Err(Error::RemoteExecution { message, stdout }) = repl.exec_("print('a')\n1/0"));
    assert!(message.as_bytes() == &traceback[..]);
    assert!(stdout == b"a\r\n");

    // Raising is a normal outcome, the session goes on.
    assert!(repl.mode().is_raw());
    device(&board).script("print(2)", b"2\r\n", b"");
    assert!(repl.exec_("print(2)").unwrap() == b"2\r\n");
}

#[test]
fn eval_trims_the_printed_value() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).script("print(6 * 7)", b"42\r\n", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.eval("6 * 7").unwrap() == b"42");
}

#[test]
fn operations_require_raw_mode() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);

    let_assert!(Err(Error::Protocol(message)) = repl.exec_raw("print(1)"));
    assert!(message.contains("raw mode"));
    let_assert!(Err(Error::Protocol(_)) = repl.exec_raw_no_follow("print(1)"));
    assert!(device(&board).programs.is_empty());

    repl.enter_raw_repl().unwrap();
    repl.exit_raw_repl().unwrap();
    assert!(repl.mode() == ReplMode::Friendly);
    let_assert!(Err(Error::Protocol(_)) = repl.eval("1"));
    assert!(device(&board).programs.is_empty());
}

#[test]
fn empty_programs_do_not_reboot() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);

    repl.enter_raw_repl().unwrap();
    let output = repl.exec_raw("").unwrap();
    assert!(output.stdout.is_empty());
    assert!(device(&board).programs == ["\n"]);
    assert!(device(&board).soft_reboots == 1);
}

#[test]
fn late_output_does_not_leak_into_the_next_response() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).trailing_garbage = b"\r\nstray output\r\n".to_vec();
    device(&board).script("print(1)", b"1\r\n", b"");
    device(&board).script("print(2)", b"2\r\n", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
    assert!(repl.exec_("print(2)").unwrap() == b"2\r\n");
}

#[test]
fn partial_lines_stay_with_their_program() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).script("print('partial', end='')", b"partial", b"");
    device(&board).script("print('next')", b"next\r\n", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.exec_("print('partial', end='')").unwrap() == b"partial");
    assert!(repl.exec_("print('next')").unwrap() == b"next\r\n");
}

#[test]
fn partial_late_output_is_skipped() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).trailing_garbage = b"no newline".to_vec();
    device(&board).script("print(1)", b"1", b"");
    device(&board).script("print(2)", b"2", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.exec_("print(1)").unwrap() == b"1");
    assert!(repl.exec_("print(2)").unwrap() == b"2");
}

#[test]
fn chatty_program_is_interrupted() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);

    repl.enter_raw_repl().unwrap();
    repl.exec_raw_no_follow("while True:\n    print('tick')").unwrap();
    device(&board).chatter = b"tick\r\n".to_vec();

    repl.enter_raw_repl().unwrap();
    assert!(!device(&board).is_running());
    device(&board).script("print(1)", b"1\r\n", b"");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
}

#[test]
fn endless_chatter_times_out() {
    let settings = common::settings()
        .read_timeout(Duration::from_millis(200))
        .finalize();
    let (mut repl, board) = common::repl(&settings);

    repl.enter_raw_repl().unwrap();
    repl.exec_raw_no_follow("while True:\n    print('tick')").unwrap();
    {
        let mut device = device(&board);
        device.chatter = b"tick\r\n".to_vec();
        device.ignore_interrupt = true;
    }

    let start = Instant::now();
    let_assert!(Err(Error::ProtocolTimeout { .. }) = repl.enter_raw_repl());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(repl.mode() == ReplMode::Unknown);
    assert!(device(&board).is_running());
}

#[test]
fn garbage_before_raw_mode_is_skipped() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).inject(b"ets Jun  8 2016 00:22:57\r\nrst:0x1 (POWERON_RESET)\r\n>>> ");

    repl.enter_raw_repl().unwrap();
    device(&board).script("print(1)", b"1\r\n", b"");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
}

#[test]
fn silent_board_times_out() {
    let settings = common::settings()
        .read_timeout(Duration::from_millis(200))
        .finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).mute = true;

    let start = Instant::now();
    let_assert!(Err(Error::ProtocolTimeout { .. }) = repl.enter_raw_repl());
    // One retry, each attempt bounded by the read timeout.
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(repl.mode() == ReplMode::Unknown);
}

#[test]
fn failed_exec_leaves_the_mode_unknown() {
    let settings = common::settings()
        .read_timeout(Duration::from_millis(200))
        .finalize();
    let (mut repl, board) = common::repl(&settings);
    repl.enter_raw_repl().unwrap();

    device(&board).mute = true;
    let_assert!(Err(Error::Protocol(message)) = repl.exec_raw("print(1)"));
    assert!(message.contains("could not exec command"));
    assert!(repl.mode() == ReplMode::Unknown);

    // Recovery goes through raw mode entry.
    device(&board).mute = false;
    repl.enter_raw_repl().unwrap();
    device(&board).script("print(1)", b"1\r\n", b"");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
}

#[test]
fn raw_paste_submission() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).paste = PasteSupport::Supported(16);

    let program = format!("x = {}\nprint(len(x))", "1".repeat(100));
    device(&board).script(&program, b"1\r\n", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.exec_(&program).unwrap() == b"1\r\n");
    assert!(repl.mode() == ReplMode::RawPasteSupported);
    assert!(repl.exec_(&program).unwrap() == b"1\r\n");

    let board = device(&board);
    assert!(board.paste_requests == 2);
    assert!(board.paste_violations == 0);
    assert!(board.programs == [program.clone(), program]);
}

#[test]
fn raw_paste_survives_reentering_raw_mode() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).paste = PasteSupport::Supported(128);

    repl.enter_raw_repl().unwrap();
    assert!(repl.mode() == ReplMode::Raw);
    repl.exec_("pass").unwrap();
    repl.enter_raw_repl().unwrap();
    assert!(repl.mode() == ReplMode::RawPasteSupported);
}

#[test]
fn refused_raw_paste_falls_back_to_plain_submissions() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).paste = PasteSupport::Refused;
    device(&board).script("print(1)", b"1\r\n", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
    assert!(repl.mode() == ReplMode::Raw);
    assert!(device(&board).paste_requests == 1);
}

#[test]
fn firmware_without_raw_paste() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).script("print(1)", b"1\r\n", b"");

    repl.enter_raw_repl().unwrap();
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
    assert!(repl.mode() == ReplMode::Raw);

    let board = device(&board);
    // The request was taken as input once and never sent again.
    assert!(board.paste_requests == 1);
    assert!(board.raw_entries == 2);
    assert!(board.programs == ["print(1)", "print(1)"]);
}

#[test]
fn raw_paste_can_be_disabled() {
    let settings = common::settings().raw_paste(false).finalize();
    let (mut repl, board) = common::repl(&settings);
    device(&board).paste = PasteSupport::Supported(32);

    repl.enter_raw_repl().unwrap();
    repl.exec_("pass").unwrap();
    assert!(device(&board).paste_requests == 0);
}

#[test]
fn no_follow_leaves_the_program_running() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);

    repl.enter_raw_repl().unwrap();
    repl.exec_raw_no_follow("while True:\n    pass").unwrap();
    assert!(repl.mode() == ReplMode::Unknown);
    assert!(device(&board).is_running());

    // Entering raw mode again interrupts it.
    repl.enter_raw_repl().unwrap();
    assert!(!device(&board).is_running());
    device(&board).script("print(1)", b"1\r\n", b"");
    assert!(repl.exec_("print(1)").unwrap() == b"1\r\n");
}

#[test]
fn cancelling_stops_the_program_and_leaves_raw_mode() {
    let settings = common::settings()
        .read_timeout(Duration::from_secs(2))
        .finalize();
    let (mut repl, board) = common::repl(&settings);
    let cancel = Arc::new(AtomicBool::new(false));
    repl.cancel_on(cancel.clone());
    repl.enter_raw_repl().unwrap();

    let flag = cancel.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        flag.store(true, Ordering::SeqCst);
    });
    let start = Instant::now();
    let_assert!(Err(Error::Interrupted) = repl.exec_raw("while True:\n    pass"));
    stopper.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(repl.mode() == ReplMode::Friendly);

    let board = device(&board);
    assert!(!board.is_running());
    assert!(board.exits == 1);
}

#[test]
fn large_programs_arrive_intact() {
    let settings = common::settings().raw_paste(false).finalize();
    let (mut repl, board) = common::repl(&settings);
    let program: String = (0..200).map(|i| format!("x{} = {}\n", i, i)).collect();

    repl.enter_raw_repl().unwrap();
    repl.exec_(&program).unwrap();
    assert!(device(&board).programs == [program]);
}

#[test]
fn closed_engine_fails_with_transport_errors() {
    let settings = common::settings().finalize();
    let (mut repl, board) = common::repl(&settings);

    repl.enter_raw_repl().unwrap();
    repl.close().unwrap();
    assert!(device(&board).closed);
    let_assert!(Err(Error::Transport(_)) = repl.enter_raw_repl());
}
