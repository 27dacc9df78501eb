#[derive(PartialEq, Debug)]
pub enum FileType {
    LogFile,
    DBLockFile,
    TableFile,
    TempFile,
    InfoLogFile,
}

pub fn log_file_name(dbname: &str, number: u64) -> String {
    assert!(number > 0);
    format!("{}/{:06}.{}", dbname, number, "log")
}

pub fn table_file_name(dbname: &str, number: u64) -> String {
    assert!(number > 0);
    format!("{}/{:06}.{}", dbname, number, "ldb")
}

pub fn sst_table_file_name(dbname: &str, number: u64) -> String {
    assert!(number > 0);
    format!("{}/{:06}.{}", dbname, number, "sst")
}

pub fn lock_file_name(dbname: &str) -> String {
    format!("{}/LOCK", dbname)
}

pub fn temp_file_name(dbname: &str, number: u64) -> String {
    format!("{}/{:06}.{}", dbname, number, "dbtmp")
}

pub fn info_log_file_name(dbname: &str) -> String {
    format!("{}/LOG", dbname)
}

pub fn old_info_log_file_name(dbname: &str) -> String {
    format!("{}/LOG.old", dbname)
}

/// Owned filenames have the form:
///    dbname/LOCK
///    dbname/LOG
///    dbname/LOG.old
///    dbname/[0-9]+.(log|sst|ldb|dbtmp)
pub fn parse_file_name(filename: &str) -> Option<(u64, FileType)> {
    if filename == "LOCK" {
        Some((0, FileType::DBLockFile))
    } else if filename == "LOG" || filename == "LOG.old" {
        Some((0, FileType::InfoLogFile))
    } else {
        let index = filename
            .chars()
            .position(|ch| !ch.is_numeric())
            .unwrap_or(filename.len());
        if let Ok(num) = filename[..index].parse::<u64>() {
            let file_type = match &filename[index..] {
                ".log" => FileType::LogFile,
                ".sst" | ".ldb" => FileType::TableFile,
                ".dbtmp" => FileType::TempFile,
                _ => return None,
            };
            Some((num, file_type))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_parse() {
        let cases = [
            ("100.log", 100, FileType::LogFile),
            ("0.log", 0, FileType::LogFile),
            ("0.sst", 0, FileType::TableFile),
            ("0.ldb", 0, FileType::TableFile),
            ("LOCK", 0, FileType::DBLockFile),
            ("LOG", 0, FileType::InfoLogFile),
            ("LOG.old", 0, FileType::InfoLogFile),
            (
                "18446744073709551615.log",
                18446744073709551615u64,
                FileType::LogFile,
            ),
        ];

        for (fname, number, type_) in cases {
            assert_eq!((number, type_), parse_file_name(fname).unwrap());
        }

        let errors = [
            "",
            "foo",
            "foo-dx-100.log",
            ".log",
            "",
            "LOC",
            "LOCKx",
            "LO",
            "LOGx",
            "18446744073709551616.log",
            "184467440737095516150.log",
            "100",
            "100.",
            "100.lop",
        ];

        for fname in errors {
            assert!(parse_file_name(fname).is_none());
        }
    }

    #[test]
    fn test_file_name_construction() {
        let fname = lock_file_name(&"foo");
        assert_eq!("foo/", &fname[..4]);
        assert_eq!(
            (0, FileType::DBLockFile),
            parse_file_name(&fname[4..]).unwrap()
        );

        let fname = log_file_name(&"foo", 192);
        assert_eq!("foo/", &fname[..4]);
        assert_eq!(
            (192, FileType::LogFile),
            parse_file_name(&fname[4..]).unwrap()
        );

        let fname = table_file_name(&"bar", 200);
        assert_eq!("bar/", &fname[..4]);
        assert_eq!(
            (200, FileType::TableFile),
            parse_file_name(&fname[4..]).unwrap()
        );

        let fname = temp_file_name(&"tmp", 999);
        assert_eq!("tmp/", &fname[..4]);
        assert_eq!(
            (999, FileType::TempFile),
            parse_file_name(&fname[4..]).unwrap()
        );

        let fname = info_log_file_name(&"foo");
        assert_eq!("foo/", &fname[..4]);
        assert_eq!(
            (0, FileType::InfoLogFile),
            parse_file_name(&fname[4..]).unwrap()
        );

        let fname = old_info_log_file_name(&"foo");
        assert_eq!("foo/", &fname[..4]);
        assert_eq!(
            (0, FileType::InfoLogFile),
            parse_file_name(&fname[4..]).unwrap()
        );
    }
}
