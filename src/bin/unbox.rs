use anyhow::Result;

fn main() -> Result<()> {
    unbox::cli::run()
}
