use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fairy::Config;
use fairy::agent::{Orchestrator, TurnOutcome};
use fairy::host::{BufferDocument, DocumentSurface};
use fairy::llm::OpenAiChat;
use fairy::realtime::{RealtimeController, WebSocketTransport};
use fairy::session::{Mode, Session, SessionHandle};
use fairy::voice::{
    AudioFrameSource, AudioPlayback, MicrophoneSource, OUTPUT_SAMPLE_RATE, PcmFormat,
    PlaybackSink, SpeechToText, calculate_energy, codec,
};

/// Fairy - speak an instruction, let a model edit the file
#[derive(Parser)]
#[command(name = "fairy", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for a spoken instruction and apply it to a file
    Listen {
        /// File to edit
        file: PathBuf,
        /// Keep listening after each instruction until Ctrl-C
        #[arg(short, long)]
        continuous: bool,
    },
    /// Open a streaming voice session on a file
    Realtime {
        /// File to edit
        file: PathBuf,
    },
    /// Test microphone input and voice detection
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,fairy=info",
        1 => "info,fairy=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Listen { file, continuous } => listen(&file, continuous).await,
        Command::Realtime { file } => realtime(&file).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Cancel the session on Ctrl-C
fn cancel_on_interrupt(handle: SessionHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            handle.cancel();
        }
    });
}

async fn listen(file: &Path, continuous: bool) -> anyhow::Result<()> {
    let config = Config::load()?;

    let host: Arc<dyn DocumentSurface> = Arc::new(BufferDocument::open(file).await?.with_echo(true));

    let mut chat = OpenAiChat::new(config.openai_key()?, config.llm.model.clone())?;
    if let Some(base_url) = &config.llm.base_url {
        chat = chat.with_base_url(base_url.as_str());
    }
    let transcriber = SpeechToText::new(
        config.voice.stt_provider,
        config.stt_key()?,
        config.voice.stt_model.clone(),
    )?;

    let orchestrator = Orchestrator::new(Arc::new(chat), Arc::new(transcriber), host)
        .with_config(config.orchestrator_config());

    let mut session = Session::with_handle(Mode::TurnBased, SessionHandle::new(continuous));
    cancel_on_interrupt(session.handle().clone());

    tracing::info!(
        file = %file.display(),
        continuous,
        model = %config.llm.model,
        "starting turn-based session"
    );

    let mut mic = MicrophoneSource::new(config.voice.energy_threshold);
    let reports = orchestrator.run(&mut session, &mut mic).await?;

    for report in &reports {
        match report.outcome {
            TurnOutcome::Completed | TurnOutcome::Fallback => {
                tracing::info!(
                    transcript = %report.transcript,
                    tools = report.tools_used(),
                    iterations = report.iterations,
                    "turn complete"
                );
            }
            outcome => tracing::info!(?outcome, "turn ended"),
        }
    }

    Ok(())
}

async fn realtime(file: &Path) -> anyhow::Result<()> {
    let config = Config::load()?;

    let host: Arc<dyn DocumentSurface> = Arc::new(BufferDocument::open(file).await?.with_echo(true));
    let playback: Arc<dyn PlaybackSink> = Arc::new(AudioPlayback::new()?);

    let transport = WebSocketTransport::connect(
        &config.realtime.url,
        &config.realtime.model,
        &config.openai_key()?,
    )
    .await?;

    let mut controller = RealtimeController::new(transport, host, playback)
        .with_config(config.realtime_config());

    let mut session = Session::new(Mode::Streaming);
    cancel_on_interrupt(session.handle().clone());

    println!("Streaming session open. Press Ctrl-C to stop.");

    let mut mic = MicrophoneSource::new(config.voice.energy_threshold)
        .with_sample_rate(OUTPUT_SAMPLE_RATE);
    controller.run(&mut session, &mut mic).await?;

    Ok(())
}

/// Test microphone with a live level meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = MicrophoneSource::default();
    let mut frames = mic.start()?;

    println!("Sample rate: {} Hz", PcmFormat::SPEECH.sample_rate);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        let mut speech_frames = 0usize;
        let mut total_frames = 0usize;
        while let Ok(frame) = frames.try_recv() {
            total_frames += 1;
            if frame.is_speech {
                speech_frames += 1;
            }
            samples.extend(frame.samples.iter().map(|&s| f32::from(s) / 32768.0));
        }

        let energy = calculate_energy(&samples);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | speech frames: {:3}/{:3} | [{}]",
            i + 1,
            energy,
            speech_frames,
            total_frames,
            meter
        );
    }

    mic.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If speech frames stay at 0 while talking, raise your input level.");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let format = PcmFormat::REALTIME_OUTPUT;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let sample_rate = format.sample_rate as f32;
    let num_samples = format.sample_rate as usize * 2;

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let samples: Vec<i16> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            ((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 * 32767.0) as i16
        })
        .collect();

    let wav = codec::encode_wav(&codec::samples_to_pcm(&samples), format);
    playback.play_wav(wav).await?;

    println!("Done! Did you hear the tone?");
    Ok(())
}
