use crate::crypto::generate_key_spec;
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub key_id: String,
}

/// Print a new `id:base64` key spec to stdout.
/// # Errors
/// Returns an error if the key id cannot be used in a spec.
pub fn execute(args: &Args) -> Result<()> {
    if args.key_id.contains(':') {
        anyhow::bail!("key id must not contain ':'");
    }
    println!("{}", generate_key_spec(&args.key_id));
    Ok(())
}
