#[macro_use]
extern crate tracing;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use base64urlsafedata::Base64UrlSafeData;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use authn_bridge::attestation::AttestationObject;
use authn_bridge::prelude::*;

#[derive(Debug, Args)]
pub struct RegisterOpt {
    /// Relying party ID (eg: `example.com`)
    #[clap(short, long)]
    pub rp_id: String,

    #[clap(short, long)]
    pub user_name: String,

    /// Name shown by the platform UI; defaults to the user name.
    #[clap(short, long, default_value = "")]
    pub display_name: String,

    /// Client data to sign; the platform hashes this with SHA-256.
    #[clap(short, long)]
    pub client_data: String,

    /// Base64url credential ID which must not be registered again. May be
    /// specified many times.
    #[clap(short, long)]
    pub exclude: Vec<String>,

    #[clap(short, long, default_value_t = 60_000)]
    pub timeout_ms: u32,
}

#[derive(Debug, Args)]
pub struct AuthenticateOpt {
    /// Relying party ID (eg: `example.com`)
    #[clap(short, long)]
    pub rp_id: String,

    /// Client data to sign; the platform hashes this with SHA-256.
    #[clap(short, long)]
    pub client_data: String,

    /// Base64url credential ID to authenticate with. May be specified many
    /// times.
    #[clap(short, long, required = true)]
    pub allow: Vec<String>,

    #[clap(short, long, default_value_t = 60_000)]
    pub timeout_ms: u32,
}

#[derive(Debug, Subcommand)]
#[clap(about = "Platform authenticator bridge")]
pub enum Opt {
    /// Registers a new credential with the platform authenticator.
    Register(RegisterOpt),
    /// Signs client data with an existing credential.
    Authenticate(AuthenticateOpt),
    /// Registers and authenticates with an in-memory soft token, and checks
    /// the signature.
    #[cfg(feature = "softtoken")]
    SelfTest,
}

#[derive(Debug, Parser)]
#[clap(about = "authn-bridge command-line tool")]
pub struct CliParser {
    /// JSON file with ceremony options, eg: `{"userVerification": "preferred"}`
    #[clap(short, long, global = true)]
    pub options: Option<PathBuf>,

    #[clap(subcommand)]
    pub commands: Opt,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterOutput {
    credential_id: Base64UrlSafeData,
    attestation_object: Base64UrlSafeData,
    fmt: Option<String>,
    used_transports: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateOutput {
    credential_id: Base64UrlSafeData,
    authenticator_data: Base64UrlSafeData,
    signature: Base64UrlSafeData,
    user_handle: Option<Base64UrlSafeData>,
    counter: Option<u32>,
}

fn load_options(path: Option<&PathBuf>) -> Result<CeremonyOptions, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(CeremonyOptions::default());
    };
    let options = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    debug!(?options, "loaded options from {}", path.display());
    Ok(options)
}

fn key_handles(ids: &[String]) -> Result<Vec<KeyHandle>, Box<dyn Error>> {
    ids.iter()
        .map(|id| {
            serde_json::from_value::<Base64UrlSafeData>(serde_json::Value::String(id.clone()))
                .map(KeyHandle::new)
                .map_err(|_| Box::<dyn Error>::from(format!("invalid base64url credential ID: {id}")))
        })
        .collect()
}

fn register(
    bridge: &mut Bridge<impl PlatformAuthenticator>,
    opt: RegisterOpt,
) -> Result<(), Box<dyn Error>> {
    let request = RegisterRequest {
        client_data: opt.client_data.into_bytes(),
        rp_id: opt.rp_id,
        user_name: opt.user_name,
        display_name: opt.display_name,
        exclude_credentials: key_handles(&opt.exclude)?,
        timeout_ms: opt.timeout_ms,
    };

    println!("Touch your security key to register...");
    let r = bridge.register(UiContext::Foreground, &request, &CancellationToken::new())?;

    let fmt = AttestationObject::try_from(r.attestation_object.as_slice())
        .map(|ao| ao.fmt)
        .map_err(|e| warn!("could not parse attestation object: {}", e))
        .ok();

    let out = RegisterOutput {
        credential_id: r.credential_id.into(),
        attestation_object: r.attestation_object.into(),
        fmt,
        used_transports: r.used_transports,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn authenticate(
    bridge: &mut Bridge<impl PlatformAuthenticator>,
    opt: AuthenticateOpt,
) -> Result<(), Box<dyn Error>> {
    let request = AuthenticateRequest {
        client_data: opt.client_data.into_bytes(),
        rp_id: opt.rp_id,
        allow_credentials: key_handles(&opt.allow)?,
        timeout_ms: opt.timeout_ms,
    };

    println!("Touch your security key to authenticate...");
    let r = bridge.authenticate(UiContext::Foreground, &request, &CancellationToken::new())?;

    let counter = authn_bridge::attestation::AuthenticatorData::try_from(
        r.authenticator_data.as_slice(),
    )
    .map(|ad| ad.counter)
    .ok();

    let out = AuthenticateOutput {
        credential_id: r.credential_id.into(),
        authenticator_data: r.authenticator_data.into(),
        signature: r.signature.into(),
        user_handle: r.user_handle.map(Into::into),
        counter,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(feature = "softtoken")]
fn self_test(options: CeremonyOptions) -> Result<(), Box<dyn Error>> {
    use authn_bridge::crypto::compute_sha256;
    use authn_bridge::softtoken::SoftToken;

    let mut bridge = Bridge::with_options(SoftToken::new()?, options);
    let cancel = CancellationToken::new();

    let r = bridge.register(
        UiContext::None,
        &RegisterRequest {
            client_data: b"self-test registration".to_vec(),
            rp_id: "example.com".to_string(),
            user_name: "self-test".to_string(),
            display_name: String::new(),
            exclude_credentials: vec![],
            timeout_ms: 10_000,
        },
        &cancel,
    )?;
    let ao = AttestationObject::try_from(r.attestation_object.as_slice())?;
    let key = ao
        .public_key()
        .ok_or("attestation object has no credential public key")?;
    info!(format = %ao.fmt, credential_id = ?r.credential_id, "registered");

    let client_data = b"self-test authentication".to_vec();
    let a = bridge.authenticate(
        UiContext::None,
        &AuthenticateRequest {
            client_data: client_data.clone(),
            rp_id: "example.com".to_string(),
            allow_credentials: vec![KeyHandle::new(r.credential_id.clone())],
            timeout_ms: 10_000,
        },
        &cancel,
    )?;

    if a.credential_id != r.credential_id {
        return Err("assertion used an unexpected credential".into());
    }
    if !key.verify_assertion(&a.authenticator_data, &compute_sha256(&client_data), &a.signature)? {
        return Err("assertion signature did not verify".into());
    }

    println!("Self test passed.");
    Ok(())
}

fn run(opt: CliParser) -> Result<(), Box<dyn Error>> {
    let options = load_options(opt.options.as_ref())?;

    match opt.commands {
        Opt::Register(o) => {
            let mut bridge = Bridge::with_options(platform_backend(), options);
            register(&mut bridge, o)
        }
        Opt::Authenticate(o) => {
            let mut bridge = Bridge::with_options(platform_backend(), options);
            authenticate(&mut bridge, o)
        }
        #[cfg(feature = "softtoken")]
        Opt::SelfTest => self_test(options),
    }
}

fn main() -> ExitCode {
    let opt = CliParser::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .compact()
        .init();

    match run(opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
