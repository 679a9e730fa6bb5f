#![forbid(unsafe_code)]

//! Sigtuna CLI — XAdES signature operations (sign, verify).

use clap::{Parser, Subcommand};
use sigtuna_core::Error;
use sigtuna_transforms::{Transform, TransformChain};
use sigtuna_xades::{FileReference, PolicyInfo, XadesSignature};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "sigtuna",
    about = "Sigtuna — XAdES signatures in pure Rust (XML-DSig, C14N, XPath Filter 2.0)",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a set of files with a XAdES signature
    Sign {
        /// Files to sign (paths become reference URIs)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Private key (PKCS#8 PEM or DER)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Signing certificate (PEM or DER)
        #[arg(long)]
        cert: PathBuf,

        /// Signature policy identifier
        #[arg(long = "policy-id")]
        policy_id: Option<String>,

        /// Location of the policy document (defaults to the identifier)
        #[arg(long = "policy-url")]
        policy_url: Option<String>,

        /// Commitment type identifier applied to every file
        #[arg(long)]
        commitment: Option<String>,

        /// Canonicalize XML files before digesting
        #[arg(long = "c14n-files")]
        c14n_files: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a XAdES signature document
    Verify {
        /// Signature XML file
        file: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List supported algorithms
    Info,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Sign {
            files,
            key,
            cert,
            policy_id,
            policy_url,
            commitment,
            c14n_files,
            output,
        } => cmd_sign(
            files, key, cert, policy_id, policy_url, commitment, c14n_files, output,
        ),
        Commands::Verify { file, verbose } => cmd_verify(file, verbose),
        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_sign(
    files: Vec<PathBuf>,
    key_path: PathBuf,
    cert_path: PathBuf,
    policy_id: Option<String>,
    policy_url: Option<String>,
    commitment: Option<String>,
    c14n_files: bool,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let key = sigtuna_keys::loader::load_signing_identity(&key_path, &cert_path)?;

    let mut sig = XadesSignature::new();
    if let Some(id) = policy_id {
        let mut policy = PolicyInfo::new(id);
        policy.url = policy_url;
        sig.properties.apply_policy(&policy);
    }

    for path in &files {
        let uri = path
            .to_str()
            .ok_or_else(|| Error::InvalidUri(format!("{}", path.display())))?;
        let chain = if c14n_files && path.extension().is_some_and(|e| e == "xml") {
            TransformChain::new(vec![Transform::Canonicalize {
                with_comments: false,
            }])
        } else {
            TransformChain::default()
        };
        let mut file = FileReference::new(uri, chain);
        file.commitment_type_id = commitment.clone();
        sig.files.push(file);
    }

    // Files and policy documents resolve through the filesystem.
    let signed = sig.create(&key, None)?;
    write_output(output, signed.as_bytes())
}

fn cmd_verify(file: PathBuf, verbose: bool) -> Result<(), Error> {
    let xml = std::fs::read_to_string(&file)
        .map_err(|e| Error::Other(format!("{}: {e}", file.display())))?;
    let sig = XadesSignature::from_xml(&xml)?;
    let report = sig.verify(None)?;

    if verbose {
        eprintln!("signature value:   {}", status(report.signature_valid));
        eprintln!("file references:   {}", status(report.references_valid));
        for (id, ok) in &report.reference_status {
            eprintln!("  {id}: {}", status(*ok));
        }
        eprintln!("signed properties: {}", status(report.properties_valid));
        if let Some(der) = &report.certificate {
            if let Ok(cert) = sigtuna_keys::x509::parse_certificate(der) {
                eprintln!("signed by:         {}", cert.tbs_certificate.subject);
            }
        }
    }

    if report.is_valid() {
        println!("OK");
        Ok(())
    } else {
        eprintln!("INVALID");
        process::exit(1);
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "valid"
    } else {
        "INVALID"
    }
}

fn cmd_info() -> Result<(), Error> {
    println!("Sigtuna — XAdES signatures in pure Rust");
    println!();
    println!("Supported digest algorithms:");
    println!("  SHA-1, SHA-256, SHA-384, SHA-512");
    println!();
    println!("Supported signature algorithms:");
    println!("  RSA PKCS#1 v1.5 (SHA-1, SHA-256, SHA-384, SHA-512)");
    println!("  DSA (SHA-1, SHA-256)");
    println!("  ECDSA P-256 (SHA-256)");
    println!();
    println!("Supported canonicalization:");
    println!("  C14N 1.0 (±comments)");
    println!();
    println!("Supported reference transforms:");
    println!("  C14N 1.0, XPath 1.0 selection, XPath Filter 2.0");
    println!();
    println!("Supported key formats:");
    println!("  PKCS#8 PEM/DER (RSA, DSA, EC P-256), X.509 certificates");
    Ok(())
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data)
            .map_err(|e| Error::Other(format!("{}: {e}", p.display()))),
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(data)
                .map_err(|e| Error::Other(format!("stdout: {e}")))
        }
    }
}
