use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
mod auth;
use keyseal::crypto::{OsRandom, ScryptParams};
use keyseal::{KeystoreService, Storage, storage::default_dir};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

#[derive(Debug, clap::Args)]
struct ScryptArgs {
    /// scrypt cost parameter N, a power of two (default: 8192)
    #[arg(long = "scrypt-n")]
    n: Option<u64>,

    /// scrypt block size r (default: 8)
    #[arg(long = "scrypt-r")]
    r: Option<u64>,

    /// scrypt parallelization p (default: 1)
    #[arg(long = "scrypt-p")]
    p: Option<u64>,
}

impl ScryptArgs {
    fn to_kdf_params(&self) -> Result<ScryptParams> {
        let default = ScryptParams::create(&OsRandom)?;

        let params = ScryptParams {
            n: self.n.unwrap_or(default.n),
            r: self.r.unwrap_or(default.r),
            p: self.p.unwrap_or(default.p),
            ..default
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Parser)]
#[command(name = "keyseal")]
#[command(
    version,
    about = "Seal signing secrets into password-protected keystore files."
)]
struct Cli {
    /// Directory for keystores written without --out
    #[arg(long, global = true, value_name = "DIR", env = "KEYSEAL_DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Seals a secret into a new keystore
    Seal {
        /// File holding the secret bytes
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Treat the input file as hex text
        #[arg(long, default_value_t = false)]
        hex: bool,

        /// Free-form label stored unencrypted in the keystore
        #[arg(long)]
        memo: Option<String>,

        /// Keystore path (default: <DIR>/<id>.json)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,

        #[command(flatten)]
        scrypt: ScryptArgs,
    },

    /// Opens a keystore and prints the secret as hex
    #[command(arg_required_else_help = true)]
    Open {
        keystore: PathBuf,

        /// Write the raw secret bytes to FILE instead of printing hex
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Shows the unencrypted metadata of a keystore
    #[command(arg_required_else_help = true)]
    Inspect { keystore: PathBuf },

    /// Changes the password of a keystore in place
    #[command(arg_required_else_help = true)]
    Passwd { keystore: PathBuf },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let service = KeystoreService::new();

    match args.command {
        Commands::Seal {
            input,
            hex,
            memo,
            out,
            scrypt,
        } => {
            let kdf = scrypt.to_kdf_params()?;
            let secret = read_secret(&input, hex)?;
            let password = auth::read_new_password_with_confirmation(auth::PASSWORD_ENV)?;

            let keystore =
                service.encrypt_secret(&secret, &password, memo.as_deref(), Some(kdf))?;
            drop(secret);

            let storage = match out {
                Some(path) => Storage::new(path),
                None => Storage::for_keystore(&resolve_dir(args.dir)?, &keystore),
            };
            if storage.exists() {
                bail!("keystore already exists at {}", storage.path().display());
            }
            storage.save(&keystore)?;
            println!(
                "sealed keystore {} -> {}",
                keystore.id,
                storage.path().display()
            );
        }
        Commands::Open { keystore, out } => {
            let storage = open_storage(keystore)?;
            let keystore = storage.load()?;
            let password = auth::read_password()?;

            let secret = service
                .decrypt(&keystore, &password)
                .context("failed to open keystore")?;

            match out {
                Some(path) => {
                    fs::write(&path, secret.expose())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("wrote {} bytes to {}", secret.len(), path.display());
                }
                None => {
                    let encoded = Zeroizing::new(hex::encode(secret.expose()));
                    println!("{}", encoded.as_str());
                }
            }
        }
        Commands::Inspect { keystore } => {
            let keystore = open_storage(keystore)?.load()?;
            let crypto = &keystore.crypto;
            let kdf = &crypto.kdfparams;

            println!("id:       {}", keystore.id);
            println!("version:  {}", keystore.version());
            println!("memo:     {}", keystore.memo.as_deref().unwrap_or("-"));
            println!("cipher:   {}", crypto.cipher);
            println!(
                "kdf:      {} (N={}, r={}, p={}, dklen={}, ~{} KiB)",
                crypto.kdf,
                kdf.n,
                kdf.r,
                kdf.p,
                kdf.dklen,
                kdf.memory_cost() / 1024
            );
            if let Err(e) = kdf.validate() {
                println!("warning:  {e}");
            }
        }
        Commands::Passwd { keystore } => {
            let storage = open_storage(keystore)?;
            let keystore = storage.load()?;
            let old = auth::read_password()?;
            let new = auth::read_new_password_with_confirmation(auth::NEW_PASSWORD_ENV)?;

            let rekeyed = service
                .change_password(&keystore, &old, &new)
                .context("failed to change password")?;
            storage.save(&rekeyed)?;
            println!("password changed; keystore id is now {}", rekeyed.id);
        }
    }

    Ok(())
}

fn init_tracing() {
    // Keep stdout for command output; diagnostics go to stderr.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(d) => Ok(d),
        None => default_dir(),
    }
}

fn open_storage(path: PathBuf) -> Result<Storage> {
    let storage = Storage::new(path);
    if !storage.exists() {
        bail!("keystore {} does not exist", storage.path().display());
    }
    Ok(storage)
}

fn read_secret(path: &Path, is_hex: bool) -> Result<Zeroizing<Vec<u8>>> {
    let raw = Zeroizing::new(
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
    );
    if !is_hex {
        return Ok(raw);
    }

    let text = std::str::from_utf8(&raw).map_err(|_| anyhow!("secret file is not hex text"))?;
    let bytes = hex::decode(text.trim()).map_err(|_| anyhow!("secret file is not valid hex"))?;
    Ok(Zeroizing::new(bytes))
}
