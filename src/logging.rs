use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize global logging (idempotent). Includes timestamp, level and target.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format(|buf, record| {
                use std::io::Write;
                let ts = buf.timestamp_millis();
                writeln!(
                    buf,
                    "{ts} [{:<5}] {} {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .try_init(); // ignore error if already initialized by tests/other code
    });
}
