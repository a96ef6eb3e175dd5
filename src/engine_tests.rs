#[cfg(test)]
mod tests {
    use crate::engine::{DEFAULT_MAX_DEPTH, Engine, RegisterError, render};
    use crate::exec::ExecErrorKind;
    use crate::funcs::FuncError;
    use crate::parse::{MAX_NESTING, ParseErrorKind};
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    #[derive(Serialize)]
    struct Filter {
        name: String,
        age: Option<u32>,
        tags: Vec<&'static str>,
    }

    #[test]
    fn render_two_markers() {
        let (sql, args) = render(
            "SELECT * FROM t WHERE a = {{ .A | __sql_arg__ }} AND b = {{ .B | __sql_arg__ }}",
            &json!({"A": "x", "B": 5}),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(args, vec![SqlValue::from("x"), SqlValue::I64(5)]);
    }

    #[test]
    fn render_without_markers_has_no_args() {
        let (sql, args) = render("SELECT {{ .Col }} FROM t", &json!({"Col": "id"})).unwrap();
        assert_eq!(sql, "SELECT id FROM t");
        assert!(args.is_empty());
    }

    #[test]
    fn identical_values_get_distinct_placeholders() {
        let (sql, args) = render(
            "{{ .A | __sql_arg__ }}, {{ .A | __sql_arg__ }}, {{ .A | __sql_arg__ }}",
            &json!({"A": 1}),
        )
        .unwrap();
        assert_eq!(sql, "$1, $2, $3");
        assert_eq!(args, vec![SqlValue::I64(1); 3]);
    }

    #[test]
    fn injected_text_only_reaches_args() {
        let evil = "x'; DROP TABLE users; --";
        let (sql, args) = render(
            "SELECT * FROM users WHERE name = {{ .Name | __sql_arg__ }}",
            &json!({"Name": evil}),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE name = $1");
        assert!(!sql.contains("DROP"));
        assert_eq!(args, vec![SqlValue::from(evil.to_string())]);
    }

    #[test]
    fn struct_context() {
        let filter = Filter {
            name: "ann".into(),
            age: None,
            tags: vec!["a", "b"],
        };
        let (sql, args) = render(
            concat!(
                "WHERE name = {{ .name | __sql_arg__ }}",
                "{{ with .age }} AND age = {{ __sql_arg__ . }}{{ end }}",
                " AND tags = {{ __sql_arg__ .tags }}",
            ),
            &filter,
        )
        .unwrap();
        assert_eq!(sql, "WHERE name = $1 AND tags = $2");
        assert_eq!(
            args,
            vec![SqlValue::from("ann"), SqlValue::Json(json!(["a", "b"]))]
        );
    }

    #[test]
    fn map_context() {
        let mut data = BTreeMap::new();
        data.insert("id", 42_u64);
        let (sql, args) = render("id = {{ .id | __sql_arg__ }}", &data).unwrap();
        assert_eq!(sql, "id = $1");
        assert_eq!(args, vec![SqlValue::I64(42)]);
    }

    #[test]
    fn scalar_json_values_map_to_sql_values() {
        let (_, args) = render(
            "{{ __sql_arg__ .N }}{{ __sql_arg__ .B }}{{ __sql_arg__ .F }}{{ __sql_arg__ .U }}{{ __sql_arg__ .Z }}",
            &json!({"N": null, "B": true, "F": 1.5, "U": u64::MAX, "Z": -3}),
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                SqlValue::Null,
                SqlValue::Bool(true),
                SqlValue::F64(1.5),
                SqlValue::U64(u64::MAX),
                SqlValue::I64(-3),
            ]
        );
    }

    #[test]
    fn parse_and_exec_errors_are_distinct() {
        let err = render("SELECT {{ .A", &json!({})).unwrap_err();
        assert!(err.is_parse());
        assert!(!err.is_exec());

        let err = render("SELECT {{ .A }}", &json!({})).unwrap_err();
        assert!(err.is_exec());
        assert!(!err.is_parse());
        assert_eq!(err.to_string(), "template: sql:1: map has no entry for key \"A\"");
    }

    #[test]
    fn unserializable_context_is_an_exec_error() {
        let mut data = BTreeMap::new();
        data.insert((1, 2), "x");
        let err = render("SELECT 1", &data).unwrap_err();
        assert!(err.is_exec());
        let crate::engine::RenderError::Exec(err) = err else {
            unreachable!();
        };
        assert!(matches!(err.kind, ExecErrorKind::InvalidContext(_)));
        assert_eq!(err.line, 0);
    }

    #[test]
    fn each_execution_starts_with_fresh_args() {
        let tmpl = Engine::new()
            .parse("a = {{ .A | __sql_arg__ }}")
            .unwrap();
        let first = tmpl.execute(&json!({"A": 1})).unwrap();
        let second = tmpl.execute(&json!({"A": 2})).unwrap();
        assert_eq!(first, ("a = $1".to_string(), vec![SqlValue::I64(1)]));
        assert_eq!(second, ("a = $1".to_string(), vec![SqlValue::I64(2)]));
    }

    #[test]
    fn rendering_is_deterministic() {
        let source = "{{range $k, $v := .}}{{$k}} = {{ __sql_arg__ $v }} {{end}}";
        let data = json!({"c": 3, "a": 1, "b": [2]});
        let first = render(source, &data).unwrap();
        for _ in 0..10 {
            assert_eq!(render(source, &data).unwrap(), first);
        }
    }

    #[test]
    fn concurrent_executions_do_not_share_args() {
        let tmpl = Arc::new(
            Engine::new()
                .parse("{{range .}}{{ __sql_arg__ . }},{{end}}")
                .unwrap(),
        );
        let handles: Vec<_> = (0..8_i64)
            .map(|n| {
                let tmpl = Arc::clone(&tmpl);
                thread::spawn(move || {
                    let items: Vec<i64> = (0..=n).map(|i| i * 100 + n).collect();
                    let out = tmpl.execute(&items).unwrap();
                    (items, out)
                })
            })
            .collect();

        for handle in handles {
            let (items, (sql, args)) = handle.join().unwrap();
            let want_sql: String = (1..=items.len()).map(|i| format!("${i},")).collect();
            assert_eq!(sql, want_sql);
            assert_eq!(args, items.into_iter().map(SqlValue::I64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn user_functions() {
        let mut engine = Engine::new();
        engine
            .add_func("upper", |args: &[Value]| match args {
                [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
                _ => Err(FuncError::custom("upper expects a string")),
            })
            .unwrap()
            .add_func("join", |args: &[Value]| {
                let parts: Vec<String> = args
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect();
                Ok(Value::String(parts.join(",")))
            })
            .unwrap();

        let (sql, args) = engine
            .render(
                "code = {{ .Code | upper | __sql_arg__ }} -- {{ join \"a\" \"b\" }}",
                &json!({"Code": "ab"}),
            )
            .unwrap();
        assert_eq!(sql, "code = $1 -- a,b");
        assert_eq!(args, vec![SqlValue::from("AB")]);

        let err = engine.render("{{ upper 1 }}", &json!({})).unwrap_err();
        assert!(err.is_exec());
        assert_eq!(
            err.to_string(),
            "template: sql:1: error calling upper: upper expects a string"
        );
    }

    #[test]
    fn unknown_function_fails_at_parse_time() {
        let err = Engine::new().parse("{{ .A | upper }}").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UndefinedFunction("upper".into()));
    }

    #[test]
    fn reserved_and_invalid_function_names() {
        let mut engine = Engine::new();
        let noop = |_: &[Value]| -> Result<Value, FuncError> { Ok(Value::Null) };
        assert_eq!(
            engine.add_func("__sql_arg__", noop).unwrap_err(),
            RegisterError::Reserved("__sql_arg__".into())
        );
        assert_eq!(
            engine.add_func("printf", noop).unwrap_err(),
            RegisterError::Reserved("printf".into())
        );
        assert_eq!(
            engine.add_func("9lives", noop).unwrap_err(),
            RegisterError::InvalidName("9lives".into())
        );
        assert_eq!(
            engine.add_func("", noop).unwrap_err(),
            RegisterError::InvalidName("".into())
        );
    }

    #[test]
    fn parse_named_reports_name() {
        let engine = Engine::new();
        let tmpl = engine.parse_named("users_by_id", "{{ .Id | __sql_arg__ }}").unwrap();
        assert_eq!(tmpl.name(), "users_by_id");

        let err = tmpl.execute(&json!({})).unwrap_err();
        assert_eq!(err.template, "users_by_id");

        let err = engine.parse_named("broken", "\n\n{{ if }}").unwrap_err();
        assert_eq!(err.template, "broken");
        assert_eq!(err.line, 3);
    }

    #[test]
    fn max_depth_defaults() {
        let mut engine = Engine::new();
        assert_eq!(engine.max_depth(), DEFAULT_MAX_DEPTH);
        engine.set_max_depth(2);
        assert_eq!(engine.max_depth(), 2);

        let source = concat!(
            "{{define \"a\"}}{{template \"b\" .}}{{end}}",
            "{{define \"b\"}}{{template \"c\" .}}{{end}}",
            "{{define \"c\"}}c{{end}}",
            "{{template \"a\" .}}",
        );
        let err = engine.render(source, &json!({})).unwrap_err();
        assert!(err.is_exec());
        assert_eq!(Engine::new().render(source, &json!({})).unwrap().0, "c");
    }

    #[test]
    fn deeply_nested_source_is_a_parse_error() {
        let n = 5000;
        let source = format!("{{{{ {}1{} }}}}", "(".repeat(n), ")".repeat(n));
        let err = render(&source, &json!({})).unwrap_err();
        assert!(err.is_parse());
        let crate::engine::RenderError::Parse(err) = err else {
            unreachable!();
        };
        assert_eq!(err.kind, ParseErrorKind::TooDeep(MAX_NESTING));
    }
}
