use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("glyphwave-cli-{}-{}", std::process::id(), name));
    fs::create_dir_all(&dir).expect("Failed to create test directory");
    dir
}

fn run_glyphwave(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_glyphwave"))
        .args(args)
        .output()
        .expect("Failed to execute glyphwave")
}

fn combined(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string() + &String::from_utf8_lossy(&output.stdout)
}

fn encode_to(path: &PathBuf, text: &str, protocol: &str) {
    let output = run_glyphwave(&["encode", path.to_str().unwrap(), "--text", text, "--protocol", protocol]);
    assert!(output.status.success(), "encode failed: {}", combined(&output));
}

#[test]
fn test_encode_then_decode() {
    let dir = test_dir("round_trip");
    let wav = dir.join("glyph.wav");
    let text_out = dir.join("glyph.txt");

    let output = run_glyphwave(&["encode", wav.to_str().unwrap(), "--text", "łᐊᒥłł.3"]);
    let output_text = combined(&output);
    assert!(output.status.success(), "encode failed: {}", output_text);
    assert!(output_text.contains("Encoded"), "unexpected output: {}", output_text);
    assert!(wav.exists(), "Output file was not created");

    let output = run_glyphwave(&[
        "decode",
        wav.to_str().unwrap(),
        "--output",
        text_out.to_str().unwrap(),
    ]);
    let output_text = combined(&output);
    assert!(output.status.success(), "decode failed: {}", output_text);
    assert!(output_text.contains("łᐊᒥłł.3"), "unexpected output: {}", output_text);
    assert_eq!(fs::read_to_string(&text_out).unwrap(), "łᐊᒥłł.3\n");
}

#[test]
fn test_encode_from_file_with_protocol() {
    let dir = test_dir("from_file");
    let input = dir.join("input.txt");
    let wav = dir.join("ultra.wav");
    fs::write(&input, "from a file\n").unwrap();

    let output = run_glyphwave(&[
        "encode",
        wav.to_str().unwrap(),
        "--input",
        input.to_str().unwrap(),
        "--protocol",
        "ultrasound-fastest",
    ]);
    assert!(output.status.success(), "encode failed: {}", combined(&output));

    let output = run_glyphwave(&["decode", wav.to_str().unwrap(), "-p", "ultrasound-fastest"]);
    assert!(output.status.success(), "decode failed: {}", combined(&output));
    assert!(combined(&output).contains("\"from a file\""));
}

#[test]
fn test_encode_rejects_oversized_text() {
    let dir = test_dir("oversized");
    let wav = dir.join("big.wav");
    let text = "x".repeat(33);

    let output = run_glyphwave(&["encode", wav.to_str().unwrap(), "-t", &text, "-p", "audible-robust"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("exceeds frame capacity"));
    assert!(!wav.exists());
}

#[test]
fn test_unknown_protocol_rejected() {
    let output = run_glyphwave(&["encode", "unused.wav", "-t", "hi", "-p", "morse"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("morse"));
}

#[test]
fn test_decode_silence_reports_no_message() {
    let dir = test_dir("silence");
    let wav = dir.join("silence.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&wav, spec).unwrap();
    for _ in 0..48_000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let output = run_glyphwave(&["decode", wav.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("No message found"));
}

#[test]
fn test_protocols_lists_every_variant() {
    let output = run_glyphwave(&["protocols"]);
    assert!(output.status.success());
    let text = combined(&output);
    for name in [
        "audible-normal",
        "audible-fast",
        "audible-fastest",
        "ultrasound-normal",
        "ultrasound-fast",
        "ultrasound-fastest",
        "audible-robust",
    ] {
        assert!(text.contains(name), "missing {} in {}", name, text);
    }
}

#[test]
fn test_simulate_verdicts() {
    let output = run_glyphwave(&[
        "simulate", "-t", "SKODEN!", "--snr-db", "40", "--echo-gain", "0", "--veto", "0.9",
    ]);
    assert!(output.status.success(), "simulate failed: {}", combined(&output));
    assert!(combined(&output).contains("clear"), "{}", combined(&output));

    let output = run_glyphwave(&["simulate", "-t", "SKODEN!", "--snr-db=-30", "--seed", "5"]);
    assert!(output.status.success(), "simulate failed: {}", combined(&output));
    assert!(combined(&output).contains("retransmit"), "{}", combined(&output));
}

#[test]
fn test_council_vote() {
    let dir = test_dir("council");
    let mut captures = Vec::new();
    for (i, text) in ["aye", "aye", "aye"].iter().enumerate() {
        let path = dir.join(format!("ballot{}.wav", i));
        encode_to(&path, text, "audible-fastest");
        captures.push(path);
    }
    let dissent = dir.join("dissent.wav");
    encode_to(&dissent, "nay", "audible-fastest");

    let mut args = vec!["council", "-p", "audible-fastest", "--ballots", "3", "--quorum", "0.9"];
    let paths: Vec<String> = captures.iter().map(|p| p.to_str().unwrap().to_string()).collect();
    args.extend(paths.iter().map(|p| p.as_str()));
    let output = run_glyphwave(&args);
    assert!(output.status.success(), "council failed: {}", combined(&output));
    assert!(combined(&output).contains("Motion PASSES"), "{}", combined(&output));

    let output = run_glyphwave(&[
        "council",
        "-p",
        "audible-fastest",
        "--ballots",
        "3",
        "--majority",
        "1.0",
        &paths[0],
        &paths[1],
        dissent.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "council failed: {}", combined(&output));
    let text = combined(&output);
    assert!(text.contains("Motion FAILS"), "{}", text);
    assert!(text.contains("Plurality glyph: \"aye\""), "{}", text);
}
