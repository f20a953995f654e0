mod error;
mod server;
mod wav;

use clap::{Parser, Subcommand};
use error::{CliError, Result};
use glyphwave_core::{
    CancellationToken, ChannelModel, Council, Decision, Decoder, Encoder, Listener,
    ProtocolVariant, QuorumPolicy,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wav::{read_wav, write_wav, WavSource};

#[derive(Parser)]
#[command(name = "glyphwave")]
#[command(about = "Acoustic glyph link: multi-tone FSK text bursts and council votes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text to a WAV burst
    Encode {
        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Text to send
        #[arg(short, long)]
        text: Option<String>,

        /// Read the text from a file instead
        #[arg(short, long, value_name = "INPUT.TXT", conflicts_with = "text")]
        input: Option<PathBuf>,

        #[arg(short, long, default_value_t = ProtocolVariant::default())]
        protocol: ProtocolVariant,
    },

    /// Decode every glyph found in a WAV capture
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Write the decoded text (one glyph per line) to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value_t = ProtocolVariant::default())]
        protocol: ProtocolVariant,

        /// Samples pulled from the capture per window
        #[arg(short, long, default_value = "4096")]
        window: usize,
    },

    /// Hold a council vote over the glyphs heard in one or more captures
    Council {
        /// Captures to listen to, in order
        #[arg(value_name = "INPUT.WAV", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, default_value_t = ProtocolVariant::default())]
        protocol: ProtocolVariant,

        /// Ballots that complete the vote
        #[arg(long, default_value = "9")]
        ballots: usize,

        /// Minimum mean resonance to pass
        #[arg(long, default_value = "0.8")]
        quorum: f32,

        /// Minimum share of ballots agreeing on the plurality text
        #[arg(long, default_value = "0.5")]
        majority: f32,
    },

    /// Send a burst through a simulated room and check it against the veto threshold
    Simulate {
        #[arg(short, long)]
        text: String,

        #[arg(short, long, default_value_t = ProtocolVariant::default())]
        protocol: ProtocolVariant,

        #[arg(long, default_value = "20")]
        snr_db: f32,

        #[arg(long, default_value = "50")]
        echo_delay_ms: f32,

        #[arg(long, default_value = "0.3")]
        echo_gain: f32,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Resonance below this asks for a retransmission
        #[arg(long, default_value = "0.997")]
        veto: f32,

        /// Keep the simulated capture as a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the protocol variants
    Protocols,

    /// Serve the codec and council over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve { .. }) {
        init_logging();
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Encode {
            output,
            text,
            input,
            protocol,
        } => {
            let text = match (text, input) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)?.trim_end().to_string(),
                (None, None) => return Err(CliError::MissingText),
            };
            encode_command(&text, &output, protocol)
        }
        Commands::Decode {
            input,
            output,
            protocol,
            window,
        } => decode_command(&input, output.as_deref(), protocol, window),
        Commands::Council {
            inputs,
            protocol,
            ballots,
            quorum,
            majority,
        } => council_command(&inputs, protocol, QuorumPolicy::new(ballots, quorum, majority)?),
        Commands::Simulate {
            text,
            protocol,
            snr_db,
            echo_delay_ms,
            echo_gain,
            seed,
            veto,
            output,
        } => {
            let channel = ChannelModel {
                snr_db,
                echo_delay_ms,
                echo_gain,
                seed,
            };
            simulate_command(&text, protocol, &channel, veto, output.as_deref())
        }
        Commands::Protocols => {
            protocols_command();
            Ok(())
        }
        Commands::Serve { bind } => serve_command(bind),
    }
}

fn encode_command(text: &str, output_path: &Path, protocol: ProtocolVariant) -> Result<()> {
    let encoder = Encoder::new(protocol);
    let waveform = encoder.encode(text)?;
    println!(
        "Encoded {} bytes with {} to {} samples ({:.0} ms)",
        text.len(),
        protocol,
        waveform.len(),
        waveform.duration_ms()
    );

    write_wav(output_path, &waveform)?;
    println!("Wrote {}", output_path.display());
    Ok(())
}

fn decode_command(
    input_path: &Path,
    output_path: Option<&Path>,
    protocol: ProtocolVariant,
    window: usize,
) -> Result<()> {
    let source = WavSource::open(input_path, window)?;
    let mut listener = Listener::new(Decoder::new(protocol), source, CancellationToken::new());

    let mut texts = Vec::new();
    for message in listener.by_ref() {
        println!(
            "Decoded \"{}\" (resonance {:.3}, sample {})",
            message.text, message.resonance, message.start_sample
        );
        texts.push(message.text);
    }

    let stats = listener.decoder().stats();
    log::info!("decoder stats: {:?}", stats);

    if texts.is_empty() {
        return Err(CliError::NoMessage(input_path.to_path_buf()));
    }

    if let Some(path) = output_path {
        let mut contents = texts.join("\n");
        contents.push('\n');
        std::fs::write(path, contents)?;
        println!("Wrote {} glyphs to {}", texts.len(), path.display());
    }
    Ok(())
}

fn council_command(inputs: &[PathBuf], protocol: ProtocolVariant, policy: QuorumPolicy) -> Result<()> {
    let council = Council::new();
    let handle = council.open_with_policy(policy)?;
    println!(
        "Council session {} opened: {} ballots, quorum {:.3}, majority {:.3}",
        handle, policy.expected_ballots, policy.quorum_threshold, policy.majority_fraction
    );

    let mut outcome = None;
    'captures: for path in inputs {
        let capture = read_wav(path)?;
        let listener = Listener::new(
            Decoder::new(protocol),
            glyphwave_core::PcmChunks::new(capture.into_samples(), 4096),
            CancellationToken::new(),
        );
        for message in listener {
            match council.submit_ballot(&handle, &message.text, message.resonance) {
                Ok(done) => {
                    println!(
                        "Ballot from {}: \"{}\" (resonance {:.3})",
                        path.display(),
                        message.text,
                        message.resonance
                    );
                    if done.is_some() {
                        outcome = done;
                        break 'captures;
                    }
                }
                Err(e) => log::warn!("ballot from {} rejected: {}", path.display(), e),
            }
        }
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => {
            println!("Captures exhausted before all ballots arrived; closing early");
            council.finalize(&handle)?
        }
    };

    println!(
        "Aggregate resonance {:.4}, agreement {:.3} over {} ballots",
        outcome.aggregate_resonance, outcome.agreement_ratio, outcome.ballots_counted
    );
    if let Some(text) = &outcome.plurality_text {
        println!("Plurality glyph: \"{}\"", text);
    }
    match outcome.decision {
        Decision::Pass => println!("Motion PASSES"),
        Decision::Fail => println!("Motion FAILS"),
        Decision::Abandoned => println!("Vote abandoned"),
    }
    Ok(())
}

fn simulate_command(
    text: &str,
    protocol: ProtocolVariant,
    channel: &ChannelModel,
    veto: f32,
    output_path: Option<&Path>,
) -> Result<()> {
    let clean = Encoder::new(protocol).encode(text)?;
    let heard = channel.apply(&clean)?;
    println!(
        "Simulated {} at {:.1} dB SNR, echo {:.0} ms x {:.2} (seed {})",
        protocol, channel.snr_db, channel.echo_delay_ms, channel.echo_gain, channel.seed
    );

    if let Some(path) = output_path {
        write_wav(path, &heard)?;
        println!("Wrote {}", path.display());
    }

    match Decoder::new(protocol).decode(heard.samples()) {
        Ok(message) if message.text == text && message.resonance >= veto => {
            println!("Resonance {:.4} >= {:.3}: clear", message.resonance, veto);
        }
        Ok(message) => {
            println!(
                "Resonance {:.4} < {:.3} or text mismatch: retransmit",
                message.resonance, veto
            );
        }
        Err(e) if e.is_no_message() => println!("No message ({}): retransmit", e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn protocols_command() {
    println!(
        "{:<20} {:>9} {:>9} {:>8} {:>8} {:>6} {:>9}",
        "name", "start Hz", "max Hz", "slot ms", "alphabet", "bands", "capacity"
    );
    for variant in ProtocolVariant::ALL {
        let spec = variant.spec();
        println!(
            "{:<20} {:>9.1} {:>9.1} {:>8.2} {:>8} {:>6} {:>9}",
            variant.name(),
            spec.start_hz,
            spec.max_freq(),
            spec.slot_duration_ms(),
            spec.alphabet,
            spec.bands,
            spec.capacity
        );
    }
}

fn serve_command(bind: SocketAddr) -> Result<()> {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(bind))?;
    Ok(())
}
