#[cfg(test)]
mod tests {
    use crate::args::Args;
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn args_add_returns_dollar_index() {
        let mut a = Args::default();
        for i in 1..=10 {
            assert_eq!(a.add(i as i64), format!("${i}"));
        }
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn args_record_keeps_insertion_order() {
        let mut a = Args::new();
        assert!(a.is_empty());
        assert_eq!(a.record("x"), 1);
        assert_eq!(a.record(5_i64), 2);
        assert_eq!(a.record("x"), 3);
        assert_eq!(
            a.values(),
            &[SqlValue::from("x"), SqlValue::I64(5), SqlValue::from("x")]
        );
    }

    #[test]
    fn args_snapshot_is_independent_copy() {
        let mut a = Args::new();
        a.add(1_i64);
        let snap = a.snapshot();
        a.add(2_i64);
        assert_eq!(snap, vec![SqlValue::I64(1)]);
        assert_eq!(a.into_values(), vec![SqlValue::I64(1), SqlValue::I64(2)]);
    }

    #[test]
    fn args_value_parses_prefix() {
        let mut a = Args::default();
        let p = a.add(123_i64);
        assert_eq!(a.value(&p), Some(&SqlValue::I64(123)));
        assert_eq!(a.value("invalid"), None);
        assert_eq!(a.value("$0"), None);
        assert_eq!(a.value("$2"), None);
        assert_eq!(a.value(&(p + "::bigint")), Some(&SqlValue::I64(123)));
    }
}
