pub mod rust_log {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::panic::Location;

    /// Emits an access log line through the `log` facade, with the request's
    /// key-value pairs attached to the record.
    pub fn log(
        level: log::Level,
        target: &str,
        module_path: &'static str,
        loc: &'static Location,
        args: fmt::Arguments<'_>,
        values: &BTreeMap<String, String>,
    ) {
        let kvs: Vec<(&str, log::kv::Value)> = values
            .iter()
            .map(|(k, v)| (k.as_str(), log::kv::Value::from_display(v)))
            .collect();
        let kvs = kvs.as_slice();

        let mut builder = log::Record::builder();

        builder
            .args(args)
            .level(level)
            .target(target)
            .module_path_static(Some(module_path))
            .file_static(Some(loc.file()))
            .line(Some(loc.line()))
            .key_values(&kvs);

        log::logger().log(&builder.build());
    }
}
