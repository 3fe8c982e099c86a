use super::*;

fn feed_all(window: &mut CommandWindow, input: &[u8]) -> heapless::Vec<Command, 16> {
    let mut out = heapless::Vec::new();
    window.feed(input, |cmd| {
        out.push(cmd).unwrap();
    });
    out
}

fn det_text(bits: &DetonateBitmap) -> heapless::String<WINDOW_LEN> {
    let mut s = heapless::String::new();
    Command::SetDetonate(*bits).write_to(&mut s).unwrap();
    s
}

#[test]
fn test_window_len_matches_longest_template() {
    assert_eq!(TEMPLATES[4].len(), WINDOW_LEN);
    assert_eq!(TEMPLATES[1].len(), 6);
}

#[test]
fn test_set_node_id() {
    let mut w = CommandWindow::new();
    assert_eq!(feed_all(&mut w, b"#SID,042;").as_slice(), &[Command::SetNodeId(42)]);
}

#[test]
fn test_read_node_id() {
    let mut w = CommandWindow::new();
    assert_eq!(feed_all(&mut w, b"#RID,;").as_slice(), &[Command::ReadNodeId]);
}

#[test]
fn test_arm_values() {
    let mut w = CommandWindow::new();
    let cmds = feed_all(&mut w, b"#ARM,1;#ARM,0;#ARM,7;#ARM,x;");
    assert_eq!(
        cmds.as_slice(),
        &[
            Command::SetArmed(true),
            Command::SetArmed(false),
            Command::SetArmed(true),
            Command::SetArmed(false),
        ]
    );
}

#[test]
fn test_malformed_decimal_is_zero() {
    let mut w = CommandWindow::new();
    let cmds = feed_all(&mut w, b"#SID,4x2;#TID,-12;#TID,999;");
    assert_eq!(
        cmds.as_slice(),
        &[
            Command::SetNodeId(0),
            Command::SetTestId(0),
            Command::SetTestId(999),
        ]
    );
}

#[test]
fn test_noise_before_and_between_commands() {
    let mut w = CommandWindow::new();
    let cmds = feed_all(&mut w, b"garbage;;\r\n#SID,007;abc#RID,;");
    assert_eq!(
        cmds.as_slice(),
        &[Command::SetNodeId(7), Command::ReadNodeId]
    );
}

#[test]
fn test_wrong_length_payload_not_recognised() {
    let mut w = CommandWindow::new();
    assert!(feed_all(&mut w, b"#SID,42;").is_empty());
    assert!(feed_all(&mut w, b"#SID,0042;").is_empty());
    assert!(feed_all(&mut w, b"#sid,042;").is_empty());
}

#[test]
fn test_split_across_chunks() {
    let mut w = CommandWindow::new();
    assert!(feed_all(&mut w, b"#SI").is_empty());
    assert!(feed_all(&mut w, b"D,1").is_empty());
    assert_eq!(feed_all(&mut w, b"23;").as_slice(), &[Command::SetNodeId(123)]);
}

#[test]
fn test_view_positions() {
    let mut w = CommandWindow::new();
    assert!(w.view(5, 3).is_none());
    for &b in b"xx#SID,042;" {
        w.push(b);
    }
    let view = w.view(5, 3).unwrap();
    assert_eq!(view.prefix, b"#SID,");
    assert_eq!(view.payload, b"042");
    assert_eq!(view.terminator, TERMINATOR);

    let short = w.view(5, 0).unwrap();
    assert_eq!(short.prefix, b"D,042");
    assert!(short.payload.is_empty());
}

#[test]
fn test_overlapping_templates_report_in_priority_order() {
    // A DET payload whose tail spells out a complete SID command.
    let mut input = heapless::Vec::<u8, WINDOW_LEN>::new();
    input.extend_from_slice(b"#DET,").unwrap();
    for _ in 0..120 {
        input.push(b'0').unwrap();
    }
    input.extend_from_slice(b"#SID,042;").unwrap();
    assert_eq!(input.len(), WINDOW_LEN);

    let mut w = CommandWindow::new();
    let cmds = feed_all(&mut w, &input);

    let mut expected_bits = [0u8; 64];
    expected_bits[63] = 0x42;
    assert_eq!(
        cmds.as_slice(),
        &[
            Command::SetNodeId(42),
            Command::SetDetonate(DetonateBitmap::from_bytes(expected_bits)),
        ]
    );
}

#[test]
fn test_partial_prefix_is_not_a_command() {
    let mut w = CommandWindow::new();
    assert_eq!(feed_all(&mut w, b"#SID,#RID,;").as_slice(), &[Command::ReadNodeId]);
    assert!(feed_all(&mut w, b"#RID,#SID,;;").is_empty());
}

#[test]
fn test_det_hex_decoding() {
    let mut bits = DetonateBitmap::new();
    bits.set(0, true);
    bits.set(5, true);
    bits.set(300, true);
    let text = det_text(&bits);
    assert_eq!(text.len(), WINDOW_LEN);
    assert!(text.starts_with("#DET,21"));

    let mut w = CommandWindow::new();
    assert_eq!(
        feed_all(&mut w, text.as_bytes()).as_slice(),
        &[Command::SetDetonate(bits)]
    );
}

#[test]
fn test_det_with_bad_hex_pair() {
    let mut bits = DetonateBitmap::new();
    bits.set(8, true);
    bits.set(16, true);
    let text = det_text(&bits);
    let mut raw = [0u8; WINDOW_LEN];
    raw.copy_from_slice(text.as_bytes());
    raw[5 + 2] = b'z';

    let mut w = CommandWindow::new();
    let cmds = feed_all(&mut w, &raw);
    let Command::SetDetonate(got) = cmds[0] else {
        panic!("expected SetDetonate, got {:?}", cmds[0]);
    };
    assert!(!got.get(8));
    assert!(got.get(16));
}

#[test]
fn test_write_to_wire_text() {
    let mut s = heapless::String::<16>::new();
    Command::SetNodeId(5).write_to(&mut s).unwrap();
    assert_eq!(s.as_str(), "#SID,005;");
    s.clear();
    Command::SetArmed(false).write_to(&mut s).unwrap();
    assert_eq!(s.as_str(), "#ARM,0;");
    s.clear();
    Command::ReadNodeId.write_to(&mut s).unwrap();
    assert_eq!(s.as_str(), "#RID,;");
}
