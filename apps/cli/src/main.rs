use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use shared::{
    domain::ClerkId,
    protocol::{Attachment, FormField, OperationOutput, SubmissionPayload},
};
use submission_core::{
    load_settings,
    transport::{HttpBalanceProvider, HttpOperationService},
    GateOptions, NonEmptyPayload, PaywallSurface, RequiredField, SubmissionController,
    SubmissionPhase, SubmissionRequest,
};

/// Submit one credit-gated operation and present the result.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    clerk_id: String,
    /// Overrides the configured balance endpoint.
    #[arg(long)]
    credits_endpoint: Option<String>,
    /// Overrides the configured operation endpoint.
    #[arg(long)]
    operation_endpoint: Option<String>,
    /// File attachments, sent as multipart parts named "file".
    #[arg(long)]
    file: Vec<PathBuf>,
    /// Form fields as key=value, sent as multipart text parts.
    #[arg(long)]
    field: Vec<String>,
    /// Raw JSON body instead of a multipart form.
    #[arg(long)]
    json: Option<String>,
    /// Fields that must be present and non-empty before submitting.
    #[arg(long)]
    require_field: Vec<String>,
    /// Where to write a binary result.
    #[arg(long, default_value = "toolgate-output.bin")]
    out: PathBuf,
    #[arg(long)]
    retry_attempts: Option<u32>,
}

struct CliPaywall;

impl PaywallSurface for CliPaywall {
    fn set_open(&self, open: bool) {
        if open {
            eprintln!("You're out of credits. Upgrade your plan to continue.");
        }
    }
}

fn build_payload(args: &Args) -> Result<SubmissionPayload> {
    if let Some(raw) = &args.json {
        if !args.file.is_empty() || !args.field.is_empty() {
            bail!("--json cannot be combined with --file/--field");
        }
        let value = serde_json::from_str(raw).context("--json body is not valid JSON")?;
        return Ok(SubmissionPayload::Json(value));
    }

    let mut fields = Vec::new();
    for raw in &args.field {
        let Some((name, value)) = raw.split_once('=') else {
            bail!("--field expects key=value, got '{raw}'");
        };
        fields.push(FormField::new(name, value));
    }

    let mut attachments = Vec::new();
    for path in &args.file {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        attachments.push(Attachment {
            field_name: "file".into(),
            filename,
            mime_type: None,
            bytes,
        });
    }

    Ok(SubmissionPayload::Multipart {
        fields,
        attachments,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(endpoint) = args.credits_endpoint.clone() {
        settings.credits_endpoint = Some(endpoint);
    }
    if let Some(endpoint) = args.operation_endpoint.clone() {
        settings.operation_endpoint = Some(endpoint);
    }
    if let Some(attempts) = args.retry_attempts {
        settings.retry_attempts = attempts;
    }

    let credits_endpoint = settings
        .credits_endpoint
        .clone()
        .context("no credits endpoint configured (flag, toolgate.toml, or APP__CREDITS_ENDPOINT)")?;
    let operation_endpoint = settings.operation_endpoint.clone().context(
        "no operation endpoint configured (flag, toolgate.toml, or APP__OPERATION_ENDPOINT)",
    )?;

    tracing::debug!(%credits_endpoint, %operation_endpoint, "gate: collaborators configured");

    let balance_provider = Arc::new(HttpBalanceProvider::new(
        &credits_endpoint,
        settings.balance_timeout(),
    )?);
    let operation_service = Arc::new(HttpOperationService::new(
        &operation_endpoint,
        settings.operation_timeout(),
    )?);

    let controller = SubmissionController::with_collaborators(
        ClerkId::new(args.clerk_id.clone()),
        balance_provider,
        operation_service,
        Arc::new(CliPaywall),
        GateOptions::from_settings(&settings),
    );

    let mut request = SubmissionRequest::new(build_payload(&args)?).with_validator(NonEmptyPayload);
    for name in &args.require_field {
        request = request.with_validator(RequiredField::new(name.clone()));
    }

    controller.submit(request).await;

    match controller.phase().await {
        SubmissionPhase::Succeeded => {
            let result = controller
                .result()
                .await
                .context("succeeded without a stored result")?;
            match result.output {
                OperationOutput::Binary { bytes, mime_type } => {
                    fs::write(&args.out, &bytes)
                        .with_context(|| format!("failed to write {}", args.out.display()))?;
                    println!(
                        "wrote {} bytes ({}) to {}",
                        bytes.len(),
                        mime_type.as_deref().unwrap_or("unknown type"),
                        args.out.display()
                    );
                }
                OperationOutput::Text(text) => println!("{text}"),
                OperationOutput::Json(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?)
                }
            }
            Ok(())
        }
        SubmissionPhase::ValidationFailed { message } => bail!("invalid input: {message}"),
        SubmissionPhase::Blocked => bail!("submission blocked: credit balance exhausted"),
        SubmissionPhase::Failed { message } => bail!("{message}"),
        other => bail!("submission ended in unexpected phase '{}'", other.label()),
    }
}
