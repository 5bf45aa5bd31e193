use log::{LevelFilter, Log, Metadata, Record};

/// Forwards `log` records to the canister debug log.
struct CanisterLogger;

fn render(record: &Record) -> String {
    format!("[{} {}] {}", record.level(), record.target(), record.args())
}

impl Log for CanisterLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            ic_cdk::api::print(render(record));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CanisterLogger = CanisterLogger;

/// Installs the canister logger. Safe to call more than once.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
