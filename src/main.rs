use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use voice_interview::bootstrap::Difficulty;
use voice_interview::session::{SessionStatus, Speaker};
use voice_interview::{
    create_router, AppState, AudioBackendFactory, Config, HttpBackend, InterviewConfig,
    NatsTransport, PacedSink, SessionBootstrapper, SessionController, SessionServices,
};

#[derive(Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Beginner,
    Intermediate,
    Advanced,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Beginner => Difficulty::Beginner,
            DifficultyArg::Intermediate => Difficulty::Intermediate,
            DifficultyArg::Advanced => Difficulty::Advanced,
        }
    }
}

#[derive(Parser)]
#[command(name = "voice-interview")]
#[command(about = "Run a spoken practice interview")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-interview")]
    config: String,

    /// Role being interviewed for
    #[arg(long)]
    job_role: String,

    #[arg(long, default_value = "Mid-level")]
    experience_level: String,

    #[arg(long)]
    company: Option<String>,

    #[arg(long)]
    job_description: Option<String>,

    #[arg(long, default_value = "behavioral")]
    interview_type: String,

    /// Interviewer persona
    #[arg(long)]
    interview_role: Option<String>,

    #[arg(long, value_enum)]
    difficulty: Option<DifficultyArg>,

    #[arg(long)]
    user_id: String,

    #[arg(long)]
    num_questions: Option<u32>,

    #[arg(long)]
    duration_minutes: Option<u32>,

    /// Stream answers from a WAV file instead of the microphone
    #[arg(long)]
    audio_file: Option<PathBuf>,

    /// Do not serve the local control API
    #[arg(long)]
    no_http: bool,

    /// Start the interview as soon as the interviewer is ready
    #[arg(long)]
    auto_start: bool,
}

impl Args {
    fn interview_config(&self) -> InterviewConfig {
        InterviewConfig {
            job_role: self.job_role.clone(),
            experience_level: self.experience_level.clone(),
            company: self.company.clone(),
            job_description: self.job_description.clone(),
            interview_type: self.interview_type.clone(),
            interview_role: self.interview_role.clone(),
            difficulty: self.difficulty.map(Difficulty::from),
            user_id: self.user_id.clone(),
            num_questions: self.num_questions,
            duration_minutes: self.duration_minutes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(path) = &args.audio_file {
        cfg.audio.source = Some(path.clone());
    }

    info!("Voice Interview v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Interview backend: {}", cfg.backend.base_url);
    info!("Event transport: {}", cfg.transport.nats_url);
    match &cfg.audio.source {
        Some(path) => info!("Audio source: {}", path.display()),
        None => info!("Audio source: default microphone"),
    }

    let backend = HttpBackend::new(
        &cfg.backend.base_url,
        cfg.backend.auth_token.clone(),
        cfg.backend.request_timeout(),
    )?;

    let services = SessionServices {
        bootstrapper: Arc::new(SessionBootstrapper::new(Arc::new(backend))),
        transport: Arc::new(NatsTransport::new(cfg.transport.nats_url.clone())),
        capture: Arc::new(AudioBackendFactory::new(
            cfg.audio.source(),
            cfg.audio.constraints(),
        )),
        sink: Arc::new(PacedSink),
    };

    let (handle, controller) = SessionController::spawn(services, cfg.controller_settings());

    let server = if args.no_http {
        None
    } else {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind control API to {}", addr))?;
        info!("Control API listening on http://{}", addr);

        let app = create_router(AppState::new(handle.clone()));
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Control API stopped: {}", e);
            }
        }))
    };

    handle.configure(args.interview_config()).await?;

    let mut views = handle.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut start_sent = false;
    let mut shown_entries = 0;
    let mut last_advisory = None;

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    warn!("Session controller stopped unexpectedly");
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, leaving interview");
                break;
            }
        }

        let view = views.borrow_and_update().clone();

        for entry in view.timeline.iter().skip(shown_entries) {
            let who = match entry.speaker {
                Speaker::Ai => "Interviewer",
                Speaker::User => "You",
                Speaker::System => "System",
            };
            info!("{}: {}", who, entry.text);
        }
        shown_entries = view.timeline.len();

        if view.advisory != last_advisory {
            if let Some(advisory) = &view.advisory {
                warn!("{}", advisory.message);
            }
            last_advisory = view.advisory.clone();
        }

        match view.session_status {
            SessionStatus::Ready if args.auto_start && !start_sent => {
                start_sent = true;
                handle.start().await?;
            }
            SessionStatus::Completed => {
                info!("Interview complete, waiting for analysis");
                let analysis = tokio::time::timeout(
                    cfg.backend.request_timeout(),
                    handle.wait_for(|v| v.analysis.is_some()),
                )
                .await;

                match analysis {
                    Ok(Ok(view)) => {
                        let json = serde_json::to_string_pretty(&view.analysis)
                            .context("Failed to serialize analysis")?;
                        println!("{}", json);
                    }
                    _ => warn!("Analysis unavailable"),
                }
                break;
            }
            SessionStatus::Error => {
                if let Some(failure) = &view.error {
                    error!("Interview failed: {} ({:?})", failure.message, failure.remediation);
                }
                break;
            }
            _ => {}
        }
    }

    handle.leave().await?;

    if let Some(server) = server {
        server.abort();
    }
    drop(handle);

    controller.await.context("Session controller panicked")?;
    info!("Goodbye");

    Ok(())
}
