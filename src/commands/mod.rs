use std::process::ExitCode;

mod clone;
mod engine;

pub(crate) use clone::run_clone;
pub(crate) use engine::run_engine;

/// Print an error chain on stderr and map it to the process exit code.
pub(crate) fn report_error(err: &anyhow::Error) -> ExitCode {
    let use_err = dblab_engine::color_enabled_stderr();
    dblab_engine::log_error_stderr(use_err, &format!("dblab: {err:#}"));
    ExitCode::from(dblab_engine::exit_code_for_anyhow(err))
}

/// Pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
