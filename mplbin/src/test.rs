use super::*;

fn encode_one(instr: &Instr) -> Vec<u8> {
    let mut out = Vec::new();
    instr.encode(&mut out).unwrap();
    out
}

fn decode_one(bytes: &[u8]) -> Instr {
    let mut reader = &bytes[1..];
    Instr::decode(bytes[0], &mut reader).unwrap()
}

#[test]
fn set_value_bytes() {
    let bytes = encode_one(&Instr::SetValue {
        var: 1,
        value: Value::Int(5),
    });

    assert_eq!(bytes, [0x11, 1, 0, 0, 0, 5, 0, 0, 0]);
}

#[test]
fn set_expr_bytes() {
    let bytes = encode_one(&Instr::SetExpr {
        var: 2,
        ty: TypeTag::FLOAT,
        expr: "(@1+1)".to_string(),
    });

    assert_eq!(
        bytes,
        [0x1A, 2, 0, 0, 0, 6, b'(', b'@', b'1', b'+', b'1', b')']
    );
}

#[test]
fn write_literal_bytes() {
    let bytes = encode_one(&Instr::WriteStr("hi".to_string()));
    assert_eq!(bytes, [0xB0, 2, b'h', b'i']);

    let bytes = encode_one(&Instr::WriteVar(3));
    assert_eq!(bytes, [0xB8, 3, 0, 0, 0]);
}

#[test]
fn unresolved_jump_bytes() {
    let bytes = encode_one(&Instr::Jump { target: -1 });
    assert_eq!(bytes, [0x30, 0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn instruction_roundtrip() {
    let instrs = vec![
        Instr::Nop,
        Instr::SetValue {
            var: 1,
            value: Value::Bool(true),
        },
        Instr::SetValue {
            var: 2,
            value: Value::Str("text".to_string()),
        },
        Instr::SetLinked {
            var: 3,
            ty: TypeTag::INT,
            linked: 1,
        },
        Instr::SetExpr {
            var: 4,
            ty: TypeTag::FLOAT,
            expr: "(@1*2)".to_string(),
        },
        Instr::Push {
            id: 2,
            procedure: true,
        },
        Instr::Jump { target: 7 },
        Instr::If {
            target: 5,
            cond: IfCond::Var(1),
        },
        Instr::If {
            target: 6,
            cond: IfCond::Expr("(@1<@2)".to_string()),
        },
        Instr::Else,
        Instr::End,
        Instr::Define { id: 1, start: 12 },
        Instr::Ret,
        Instr::Call { id: 1 },
        Instr::WriteVar(4),
        Instr::Input {
            var: 5,
            ty: TypeTag::STRING,
        },
        Instr::Include {
            index: 0,
            path: "lib.bin".to_string(),
        },
        Instr::Eof,
    ];

    for instr in &instrs {
        assert_eq!(decode_one(&encode_one(instr)), *instr);
    }

    assert_eq!(instrs[0].opcode(), Opcode::NOP);
    assert_eq!(instrs[instrs.len() - 1].opcode(), Opcode::EOF);
}

#[test]
fn inline_if_never_serialized() {
    let mut reader = &[][..];
    assert!(matches!(
        Instr::decode(0x60, &mut reader),
        Err(Error::InvalidOpcode(0x60))
    ));
}

#[test]
fn eof_is_normalized() {
    let module = Module::from(Vec::new(), vec![Instr::Nop], Vec::new());
    assert_eq!(module.instructions(), &[Instr::Nop, Instr::Eof]);

    let module = Module::from(
        Vec::new(),
        vec![Instr::Eof, Instr::Nop, Instr::Eof],
        Vec::new(),
    );
    assert_eq!(module.instructions(), &[Instr::Eof]);
}

#[test]
fn write_read() {
    let path = "test.bin";

    let includes = vec![Instr::Include {
        index: 0,
        path: "lib.bin".to_string(),
    }];
    let instructions = vec![
        Instr::SetValue {
            var: 1,
            value: Value::Int(7),
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ];
    let data = vec![
        DataEntry {
            intersections: vec![(0, 4)],
            ..DataEntry::variable(1, "k")
        },
        DataEntry::procedure(1, "main"),
        DataEntry {
            import: Some(0),
            ..DataEntry::variable(2, "shared")
        },
    ];

    let module_orig = Module::from(includes, instructions, data);

    write_file(path, &module_orig).unwrap();

    let module_read = read_file(path).unwrap();

    assert_eq!(module_orig, module_read);

    std::fs::remove_file(path).unwrap();
}
