#[cfg(test)]
mod tests {
    use crate::funcs::is_builtin;
    use crate::marker::SQL_ARG_FUNC;
    use crate::node::{Branch, Command, Node, Operand, Pipe, TreeSet};
    use crate::parse::{MAX_NESTING, ParseError, ParseErrorKind, parse};
    use pretty_assertions::assert_eq;

    fn parse_sql(source: &str) -> Result<TreeSet, ParseError> {
        parse("sql", source, &|name| name == SQL_ARG_FUNC || is_builtin(name))
    }

    fn kind_of(source: &str) -> ParseErrorKind {
        parse_sql(source).unwrap_err().kind
    }

    fn pipe(line: usize, cmds: Vec<Vec<Operand>>) -> Pipe {
        Pipe {
            line,
            decl: vec![],
            is_assign: false,
            cmds: cmds.into_iter().map(|args| Command { args }).collect(),
        }
    }

    fn field(name: &str) -> Operand {
        Operand::Field(vec![name.to_string()])
    }

    #[test]
    fn parses_marker_pipeline() {
        let set = parse_sql("a = {{ .A | __sql_arg__ }}").unwrap();
        assert_eq!(
            set.root,
            vec![
                Node::Text("a = ".into()),
                Node::Action(pipe(
                    1,
                    vec![vec![field("A")], vec![Operand::Ident(SQL_ARG_FUNC.into())]]
                )),
            ]
        );
        assert!(set.defs.is_empty());
    }

    #[test]
    fn parses_if_else_if_chain() {
        let set = parse_sql("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").unwrap();
        let inner = Node::If(Branch {
            pipe: pipe(1, vec![vec![field("B")]]),
            list: vec![Node::Text("b".into())],
            else_list: Some(vec![Node::Text("c".into())]),
        });
        assert_eq!(
            set.root,
            vec![Node::If(Branch {
                pipe: pipe(1, vec![vec![field("A")]]),
                list: vec![Node::Text("a".into())],
                else_list: Some(vec![inner]),
            })]
        );
    }

    #[test]
    fn parses_else_with_chain() {
        let set = parse_sql("{{with .A}}a{{else with .B}}b{{else}}c{{end}}").unwrap();
        let inner = Node::With(Branch {
            pipe: pipe(1, vec![vec![field("B")]]),
            list: vec![Node::Text("b".into())],
            else_list: Some(vec![Node::Text("c".into())]),
        });
        assert_eq!(
            set.root,
            vec![Node::With(Branch {
                pipe: pipe(1, vec![vec![field("A")]]),
                list: vec![Node::Text("a".into())],
                else_list: Some(vec![inner]),
            })]
        );
    }

    #[test]
    fn parses_range_declarations() {
        let set = parse_sql("{{range $i, $e := .Items}}{{$i}}{{end}}").unwrap();
        let Node::Range(branch) = &set.root[0] else {
            panic!("expected range, got {:?}", set.root[0]);
        };
        assert_eq!(branch.pipe.decl, vec!["$i".to_string(), "$e".to_string()]);
        assert!(!branch.pipe.is_assign);
        assert_eq!(
            branch.list,
            vec![Node::Action(pipe(
                1,
                vec![vec![Operand::Variable {
                    name: "$i".into(),
                    fields: vec![]
                }]]
            ))]
        );
    }

    #[test]
    fn parses_define_template_and_block() {
        let set = parse_sql(
            "{{define \"cond\"}}x = {{ . }}{{end}}{{template \"cond\" .X}}{{block \"tail\" .}}LIMIT 1{{end}}",
        )
        .unwrap();
        assert_eq!(set.defs.len(), 2);
        assert!(set.lookup("cond").is_some());
        assert_eq!(set.lookup("tail"), Some(&vec![Node::Text("LIMIT 1".into())]));
        assert!(set.lookup("sql").is_some());
        assert_eq!(
            set.root,
            vec![
                Node::Template {
                    name: "cond".into(),
                    pipe: Some(pipe(1, vec![vec![field("X")]])),
                    line: 1,
                },
                Node::Template {
                    name: "tail".into(),
                    pipe: Some(pipe(1, vec![vec![Operand::Dot]])),
                    line: 1,
                },
            ]
        );
    }

    #[test]
    fn parses_parenthesized_pipeline_with_chain() {
        let set = parse_sql("{{ (index .Rows 0).Name }}").unwrap();
        let Node::Action(p) = &set.root[0] else {
            panic!("expected action");
        };
        let Operand::Pipe { pipe: inner, fields } = &p.cmds[0].args[0] else {
            panic!("expected parenthesized pipeline");
        };
        assert_eq!(fields, &vec!["Name".to_string()]);
        assert_eq!(inner.cmds[0].args[0], Operand::Ident("index".into()));
        assert_eq!(inner.cmds[0].args.len(), 3);
    }

    #[test]
    fn error_reports_template_and_line() {
        let err = parse_sql("SELECT *\nFROM t\nWHERE a = {{ .A | nope }}").unwrap_err();
        assert_eq!(err.template, "sql");
        assert_eq!(err.line, 3);
        assert_eq!(err.kind, ParseErrorKind::UndefinedFunction("nope".into()));
        assert_eq!(
            err.to_string(),
            "template: sql:3: function \"nope\" not defined"
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(kind_of("a = {{ .A"), ParseErrorKind::UnclosedAction);
        assert_eq!(kind_of("{{ }}"), ParseErrorKind::MissingValue("command".into()));
        assert_eq!(kind_of("{{if .A}}x"), ParseErrorKind::UnexpectedEof);
        assert_eq!(kind_of("x{{end}}"), ParseErrorKind::UnexpectedDirective("{{end}}"));
        assert_eq!(kind_of("{{else}}"), ParseErrorKind::UnexpectedDirective("{{else}}"));
        assert_eq!(kind_of("{{ $x }}"), ParseErrorKind::UndefinedVariable("$x".into()));
        assert_eq!(kind_of("{{ $x = 1 }}"), ParseErrorKind::UndefinedVariable("$x".into()));
        assert_eq!(kind_of("{{ .A | }}"), ParseErrorKind::EmptyCommand);
        assert_eq!(kind_of("{{ .A | \"x\" }}"), ParseErrorKind::NonExecutable(2));
        assert_eq!(kind_of("{{ (.A }}"), ParseErrorKind::UnclosedParen);
        assert_eq!(kind_of("{{ .A) }}"), ParseErrorKind::UnexpectedRightParen);
        assert_eq!(kind_of("{{ 12ab }}"), ParseErrorKind::BadNumber("12ab".into()));
        assert_eq!(kind_of("{{break}}"), ParseErrorKind::OutsideRange("{{break}}"));
        assert_eq!(
            kind_of("{{if $a, $b := .X}}{{end}}"),
            ParseErrorKind::TooManyDecls("if".into())
        );
        assert_eq!(
            kind_of("{{define \"a\"}}{{end}}{{define \"a\"}}{{end}}"),
            ParseErrorKind::Redefined("a".into())
        );
        assert_eq!(
            kind_of("{{if .A}}{{define \"a\"}}{{end}}{{end}}"),
            ParseErrorKind::UnexpectedToken {
                token: "<define>".into(),
                context: "nested block".into()
            }
        );
    }

    #[test]
    fn variable_scope_ends_with_block() {
        assert!(parse_sql("{{with $x := .A}}{{$x}}{{end}}").is_ok());
        assert_eq!(
            kind_of("{{with $x := .A}}{{end}}{{$x}}"),
            ParseErrorKind::UndefinedVariable("$x".into())
        );
        assert_eq!(
            kind_of("{{range .A}}{{$x := 1}}{{end}}{{$x}}"),
            ParseErrorKind::UndefinedVariable("$x".into())
        );
    }

    #[test]
    fn define_body_does_not_see_outer_variables() {
        assert_eq!(
            kind_of("{{$x := 1}}{{define \"d\"}}{{$x}}{{end}}"),
            ParseErrorKind::UndefinedVariable("$x".into())
        );
    }

    #[test]
    fn break_inside_range_only() {
        assert!(parse_sql("{{range .A}}{{if .}}{{break}}{{end}}{{continue}}{{end}}").is_ok());
        assert_eq!(
            kind_of("{{range .A}}{{else}}{{continue}}{{end}}"),
            ParseErrorKind::OutsideRange("{{continue}}")
        );
    }

    #[test]
    fn spaced_comment_is_not_a_comment() {
        assert_eq!(kind_of("{{ /* c */ }}"), ParseErrorKind::UnexpectedChar('/'));
        assert!(parse_sql("a {{/* c */}} {{- /* d */ -}} b").is_ok());
    }

    #[test]
    fn deep_parens_are_rejected() {
        let n = 1000;
        let source = format!("{{{{ {}1{} }}}}", "(".repeat(n), ")".repeat(n));
        assert_eq!(
            parse_sql(&source).unwrap_err().kind,
            ParseErrorKind::TooDeep(MAX_NESTING)
        );

        let ok = format!("{{{{ {}1{} }}}}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse_sql(&ok).is_ok());
    }

    #[test]
    fn deep_blocks_are_rejected() {
        let n = 1000;
        let source = format!("{}x{}", "{{if 1}}".repeat(n), "{{end}}".repeat(n));
        assert_eq!(kind_of(&source), ParseErrorKind::TooDeep(MAX_NESTING));

        let chain = format!("{{{{if 0}}}}{}{{{{end}}}}", "{{else if 0}}".repeat(n));
        assert_eq!(kind_of(&chain), ParseErrorKind::TooDeep(MAX_NESTING));

        let blocks = format!("{}x{}", "{{block \"b\" .}}".repeat(n), "{{end}}".repeat(n));
        assert_eq!(kind_of(&blocks), ParseErrorKind::TooDeep(MAX_NESTING));

        let ok = format!("{}x{}", "{{with 1}}".repeat(MAX_NESTING), "{{end}}".repeat(MAX_NESTING));
        assert!(parse_sql(&ok).is_ok());
    }
}
