use anyhow::Result;
use vergen::{vergen, Config};

fn main() -> Result<()> {
    // trigger recompilation when a new migration or email template is added
    println!("cargo:rerun-if-changed=migrations-sqlx");
    println!("cargo:rerun-if-changed=templates");

    let mut config = Config::default();
    // don't fail the build when no git repository is available
    *config.git_mut().skip_if_error_mut() = true;
    vergen(config)
}
