//! A shell-script stand-in for mysqldump.

use std::path::{Path, PathBuf};

use super::Exporter;
use crate::config::{DatabaseConfig, ExportConfig};

/// Echoes its arguments and the password it was given, then a fake
/// `CREATE TABLE`. Fails with status 2 for any table whose name contains
/// "broken".
const FAKE_DUMP: &str = r#"
for last; do :; done
case "$last" in
  *broken*)
    echo "mysqldump: Couldn't find table: \"$last\"" >&2
    exit 2
    ;;
esac
echo "-- args: $*"
echo "-- password: ${MYSQL_PWD:-<none>}"
echo "CREATE TABLE \`$last\` (id INT);"
"#;

/// Exporter writing into `{dir}/work`, running the fake dump through
/// `/bin/sh` so the script never needs to be executable.
pub(crate) fn fake_exporter(dir: &Path, password: &str) -> Exporter {
    let script = dir.join("fake-dump.sh");
    std::fs::write(&script, FAKE_DUMP).unwrap();

    Exporter::new(
        ExportConfig {
            dump_binary: PathBuf::from("/bin/sh"),
            work_dir: dir.join("work"),
            extra_args: vec![script.to_string_lossy().to_string()],
        },
        DatabaseConfig {
            host: "db.internal".into(),
            port: 3307,
            username: "archiver".into(),
            password: password.into(),
            database: "warehouse".into(),
            connect_timeout_secs: 10,
        },
    )
}
