use crate::assembler::{
    Assembler, MAX_ENTRY_WORD_LENGTH, MAX_REFERENCES, MAX_TOKEN_LENGTH,
};
use crate::labels::MAX_LABELS;
use crate::macros::MAX_MACROS;
use crate::{AssemblerError, AssemblerErrorKind, MemoryLoader};

fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new(MemoryLoader::new());
    asm.assemble(source)?;
    Ok(asm.rom().to_vec())
}

fn assemble_with(loader: MemoryLoader, source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new(loader);
    asm.assemble(source)?;
    Ok(asm.rom().to_vec())
}

fn error_of(source: &str) -> AssemblerError {
    assemble(source).unwrap_err()
}

#[test]
fn assembles_literals_and_opcodes() -> Result<(), AssemblerError> {
    assert_eq!(assemble("#01 #02 ADD")?, vec![0x80, 0x01, 0x80, 0x02, 0x18]);
    assert_eq!(assemble("#1234")?, vec![0xa0, 0x12, 0x34]);
    assert_eq!(assemble("12 3456")?, vec![0x12, 0x34, 0x56]);
    assert_eq!(assemble("ADD2k JMP2r BRK LIT LIT2r")?, vec![0xb8, 0x6c, 0x00, 0x80, 0xe0]);
    Ok(())
}

#[test]
fn skips_nested_comments() -> Result<(), AssemblerError> {
    assert_eq!(assemble("( a ( nested ) (x) b ) #01")?, vec![0x80, 0x01]);
    Ok(())
}

#[test]
fn rejects_malformed_comments() {
    assert_eq!(error_of("(a b )").error_kind(), &AssemblerErrorKind::MalformedComment);
    let err = error_of("#01 ( never closed");
    assert_eq!(err.error_kind(), &AssemblerErrorKind::MalformedComment);
    assert_eq!(err.token(), Some("("));
}

#[test]
fn brackets_are_ignored() -> Result<(), AssemblerError> {
    assert_eq!(assemble("[ #01 ]")?, vec![0x80, 0x01]);
    Ok(())
}

#[test]
fn raw_strings() -> Result<(), AssemblerError> {
    assert_eq!(assemble("\"hi 00")?, vec![b'h', b'i', 0x00]);
    Ok(())
}

#[test]
fn absolute_literal_reference() -> Result<(), AssemblerError> {
    // LIT2 at 0100, BRK at 0103, data at 0104
    assert_eq!(
        assemble("|0100 ;data BRK @data 2a")?,
        vec![0xa0, 0x01, 0x04, 0x00, 0x2a]
    );
    Ok(())
}

#[test]
fn raw_absolute_reference() -> Result<(), AssemblerError> {
    assert_eq!(assemble("@here :here =here")?, vec![0x01, 0x00, 0x01, 0x00]);
    Ok(())
}

#[test]
fn forward_immediate_jump() -> Result<(), AssemblerError> {
    assert_eq!(
        assemble("!end #01 @end BRK")?,
        vec![0x40, 0x00, 0x02, 0x80, 0x01, 0x00]
    );
    assert_eq!(
        assemble("#00 ?end #01 @end BRK")?,
        vec![0x80, 0x00, 0x20, 0x00, 0x02, 0x80, 0x01, 0x00]
    );
    Ok(())
}

#[test]
fn implicit_call_uses_the_whole_word() -> Result<(), AssemblerError> {
    assert_eq!(
        assemble("@main sub BRK @sub JMP2r")?,
        vec![0x60, 0x00, 0x01, 0x00, 0x6c]
    );
    Ok(())
}

#[test]
fn backward_relative_byte() -> Result<(), AssemblerError> {
    // target 0100 - (site 0101 + 2) = -3
    assert_eq!(assemble("@loop ,loop JMP")?, vec![0x80, 0xfd, 0x0c]);
    // raw: target 0100 - (site 0100 + 2) = -2
    assert_eq!(assemble("@back _back")?, vec![0xfe]);
    Ok(())
}

#[test]
fn relative_byte_range_is_checked() -> Result<(), AssemblerError> {
    assemble(",next $80 @next BRK")?;
    let err = error_of(",next $81 @next BRK");
    assert_eq!(err.error_kind(), &AssemblerErrorKind::ReferenceTooFar);
    assert_eq!(err.token(), Some("next"));

    // target 0100 - (site 017e + 2) = -128
    let rom = assemble("@a $7d ,a")?;
    assert_eq!(rom.last(), Some(&0x80));
    let err = error_of("@a $7e ,a");
    assert_eq!(err.error_kind(), &AssemblerErrorKind::ReferenceTooFar);
    assert_eq!(err.token(), Some("a"));
    Ok(())
}

#[test]
fn zero_page_references() -> Result<(), AssemblerError> {
    assert_eq!(
        assemble("|0000 @var $1 @other $1 |0100 .var LDZ -other")?,
        vec![0x80, 0x00, 0x10, 0x01]
    );
    Ok(())
}

#[test]
fn sub_labels_resolve_in_scope() -> Result<(), AssemblerError> {
    let mut asm = Assembler::new(MemoryLoader::new());
    asm.assemble("@parent &child ;&child ;parent/child")?;
    assert_eq!(asm.rom(), &[0xa0, 0x01, 0x00, 0xa0, 0x01, 0x00]);
    assert_eq!(asm.labels().lookup("parent")?.references, 1);
    assert_eq!(asm.labels().lookup("parent/child")?.references, 2);
    Ok(())
}

#[test]
fn sub_labels_default_to_reset_scope() -> Result<(), AssemblerError> {
    let mut asm = Assembler::new(MemoryLoader::new());
    asm.assemble("&x BRK")?;
    assert_eq!(asm.labels().lookup("on-reset/x")?.address, 0x0100);
    Ok(())
}

#[test]
fn unused_labels_skip_devices() -> Result<(), AssemblerError> {
    let mut asm = Assembler::new(MemoryLoader::new());
    asm.assemble("@used @unused @Device ;used")?;
    let unused: Vec<&str> = asm.labels().unused_labels().map(|l| l.name.as_str()).collect();
    assert_eq!(unused, vec!["unused"]);
    Ok(())
}

#[test]
fn expands_macros_in_place() -> Result<(), AssemblerError> {
    let mut asm = Assembler::new(MemoryLoader::new());
    asm.assemble("%inc2 { #01 ADD } #05 inc2 inc2")?;
    assert_eq!(asm.rom(), &[0x80, 0x05, 0x80, 0x01, 0x18, 0x80, 0x01, 0x18]);
    assert_eq!(asm.macro_count(), 1);
    Ok(())
}

#[test]
fn comments_inside_macros_stay_inside() -> Result<(), AssemblerError> {
    assert_eq!(assemble("%m { ( c ) #01 } m #02")?, vec![0x80, 0x01, 0x80, 0x02]);
    Ok(())
}

#[test]
fn macro_body_errors() {
    assert_eq!(error_of("%m { #01").error_kind(), &AssemblerErrorKind::UnterminatedMacro);
    assert_eq!(error_of("%m { %n }").error_kind(), &AssemblerErrorKind::NestedMacro);
    let long = format!("%m {{ {} }}", vec!["#01"; 65].join(" "));
    assert_eq!(error_of(&long).error_kind(), &AssemblerErrorKind::MacroTooLong);
}

#[test]
fn macro_names_are_checked() {
    assert_eq!(error_of("%m { } %m { }").error_kind(), &AssemblerErrorKind::DuplicateMacro);
    assert_eq!(error_of("%ab { }").error_kind(), &AssemblerErrorKind::InvalidMacroName);
    assert_eq!(error_of("%DUP2 { }").error_kind(), &AssemblerErrorKind::InvalidMacroName);
}

#[test]
fn recursive_macros_hit_the_nesting_limit() {
    let err = error_of("%loop { loop } loop");
    assert_eq!(err.error_kind(), &AssemblerErrorKind::NestingTooDeep);
    assert_eq!(err.token(), Some("loop"));
}

#[test]
fn includes_are_assembled_in_place() -> Result<(), AssemblerError> {
    let loader = MemoryLoader::new().with_file("lib.tal", "@lib #01 JMP2r");
    assert_eq!(
        assemble_with(loader, "lib BRK ~lib.tal")?,
        vec![0x60, 0x00, 0x01, 0x00, 0x80, 0x01, 0x6c]
    );
    Ok(())
}

#[test]
fn missing_include() {
    let err = error_of("~nope.tal");
    assert_eq!(err.error_kind(), &AssemblerErrorKind::IncludeMissing);
    assert_eq!(err.token(), Some("~nope.tal"));
}

#[test]
fn self_include_hits_the_nesting_limit() {
    let loader = MemoryLoader::new().with_file("a.tal", "~a.tal");
    let err = assemble_with(loader, "~a.tal").unwrap_err();
    assert_eq!(err.error_kind(), &AssemblerErrorKind::NestingTooDeep);
}

#[test]
fn label_names_are_checked() -> Result<(), AssemblerError> {
    assert_eq!(error_of("@a @a").error_kind(), &AssemblerErrorKind::DuplicateLabel);
    assert_eq!(error_of("@ab").error_kind(), &AssemblerErrorKind::InvalidLabelName);
    assert_eq!(error_of("@abcd").error_kind(), &AssemblerErrorKind::InvalidLabelName);
    assert_eq!(error_of("@ADD").error_kind(), &AssemblerErrorKind::InvalidLabelName);
    assert_eq!(error_of("@LIT2").error_kind(), &AssemblerErrorKind::InvalidLabelName);
    assert_eq!(error_of("@BRK").error_kind(), &AssemblerErrorKind::InvalidLabelName);
    assert_eq!(error_of("@").error_kind(), &AssemblerErrorKind::InvalidLabelName);
    assemble("@abc @ADDx")?;
    Ok(())
}

#[test]
fn sub_label_length_is_bounded() {
    let scope = "s".repeat(40);
    let child = "c".repeat(23);
    let err = error_of(&format!("@{scope} &{child}"));
    assert_eq!(err.error_kind(), &AssemblerErrorKind::SubLabelTooLong);
}

#[test]
fn write_cursor_rules() {
    assert_eq!(error_of("|00 #01").error_kind(), &AssemblerErrorKind::ZeroPageWrite);
    assert_eq!(error_of("#01 |0100 #02").error_kind(), &AssemblerErrorKind::MemoryOverwrite);
    assert_eq!(error_of("|fffe 01 02").error_kind(), &AssemblerErrorKind::ImageOverflow);
}

#[test]
fn relative_padding_moves_forward() -> Result<(), AssemblerError> {
    assert_eq!(assemble("01 $2 02")?, vec![0x01, 0x00, 0x00, 0x02]);
    Ok(())
}

#[test]
fn token_errors() {
    assert_eq!(error_of(&"a".repeat(63)).error_kind(), &AssemblerErrorKind::InvalidToken);
    assert_eq!(error_of("|xyz").error_kind(), &AssemblerErrorKind::InvalidPadding);
    assert_eq!(error_of("$").error_kind(), &AssemblerErrorKind::InvalidPadding);
    assert_eq!(error_of("#1").error_kind(), &AssemblerErrorKind::InvalidHexLiteral);
    assert_eq!(error_of("#123").error_kind(), &AssemblerErrorKind::InvalidHexLiteral);
    assert_eq!(error_of("#GG").error_kind(), &AssemblerErrorKind::InvalidHexLiteral);
}

#[test]
fn entry_words_have_a_shorter_limit() -> Result<(), AssemblerError> {
    assert_eq!((MAX_ENTRY_WORD_LENGTH, MAX_TOKEN_LENGTH), (0x3d, 0x3f));
    let long = "a".repeat(MAX_ENTRY_WORD_LENGTH + 1);
    let err = error_of(&long);
    assert_eq!(err.error_kind(), &AssemblerErrorKind::InvalidToken);
    assert_eq!(err.token(), Some(long.as_str()));
    // the same word is only checked against the general limit inside an include
    let included = format!("@{}", "b".repeat(MAX_ENTRY_WORD_LENGTH));
    let loader = MemoryLoader::new().with_file("long.tal", &included);
    assert_eq!(assemble_with(loader, "~long.tal")?, Vec::<u8>::new());
    Ok(())
}

#[test]
fn table_caps_match_the_format_limits() {
    assert_eq!((MAX_LABELS, MAX_MACROS, MAX_REFERENCES), (1024, 256, 4096));
}

#[test]
fn unknown_reference_names_the_label() {
    let err = error_of(";nowhere");
    assert_eq!(err.error_kind(), &AssemblerErrorKind::UnknownReference);
    assert_eq!(err.token(), Some("nowhere"));
}

#[test]
fn table_caps_are_enforced() {
    let mut asm = Assembler::<MemoryLoader, 2, 1, 2>::with_caps(MemoryLoader::new());
    let err = asm.assemble("@a @b @c").unwrap_err();
    assert_eq!(err.error_kind(), &AssemblerErrorKind::MaxLabelsExceeded);

    let mut asm = Assembler::<MemoryLoader, 2, 1, 2>::with_caps(MemoryLoader::new());
    let err = asm.assemble("%x { } %y { }").unwrap_err();
    assert_eq!(err.error_kind(), &AssemblerErrorKind::MaxMacrosExceeded);

    let mut asm = Assembler::<MemoryLoader, 2, 1, 2>::with_caps(MemoryLoader::new());
    let err = asm.assemble("@a ;a ;a ;a").unwrap_err();
    assert_eq!(err.error_kind(), &AssemblerErrorKind::MaxReferencesExceeded);
}
