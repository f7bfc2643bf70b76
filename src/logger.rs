/// Initializes the logging system.
///
/// Compilation is best-effort and reports dropped predicates and stages
/// through the `log` facade; callers that want to see those records load a
/// log4rs configuration once at startup.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file("log4rs.yaml", Default::default())?;
    Ok(())
}
