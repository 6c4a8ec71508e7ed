/// Placeholders recognized inside template text, written as `{name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    MandInColumns,
    MandInColumnsWithQ,
    MandInColumnsEqQ,
    OptOutColumns,
    OptOutColumnsTmp,
    OptWhereMatchColumnsEq,
    MandWhereMatchColumnsEq,
    MandWhereMatchColumnsSiblingGt,
    MandWhereMatchColumnsSiblingGe,
    OptAndMatchColumnsEqTmp,
    MandAndMatchColumnsEqTmp,
    MandAndMatchColumnsEq,
    OptAndMatchColumnsEqCandidate,
    MandWhereInstanceKeyEq,
    MandWhereParentKeyEq,
    PrimaryKeyColumns,
    PrimaryKeyColumnsTmp,
    Config1PkEqTmp,
    Config2PkEqTmp,
    Config1NonPkEqTmp,
    Config2NonPkEqTmp,
    Config2AllColsEqTmp,
    Config1SetNonPkFromConfig2,
    CandidatePkEqTmp,
    Config1TableName,
    Config2TableName,
    CandidateTableName,
    ParentTableName,
}

impl Token {
    pub const ALL: [Token; 28] = [
        Token::MandInColumns,
        Token::MandInColumnsWithQ,
        Token::MandInColumnsEqQ,
        Token::OptOutColumns,
        Token::OptOutColumnsTmp,
        Token::OptWhereMatchColumnsEq,
        Token::MandWhereMatchColumnsEq,
        Token::MandWhereMatchColumnsSiblingGt,
        Token::MandWhereMatchColumnsSiblingGe,
        Token::OptAndMatchColumnsEqTmp,
        Token::MandAndMatchColumnsEqTmp,
        Token::MandAndMatchColumnsEq,
        Token::OptAndMatchColumnsEqCandidate,
        Token::MandWhereInstanceKeyEq,
        Token::MandWhereParentKeyEq,
        Token::PrimaryKeyColumns,
        Token::PrimaryKeyColumnsTmp,
        Token::Config1PkEqTmp,
        Token::Config2PkEqTmp,
        Token::Config1NonPkEqTmp,
        Token::Config2NonPkEqTmp,
        Token::Config2AllColsEqTmp,
        Token::Config1SetNonPkFromConfig2,
        Token::CandidatePkEqTmp,
        Token::Config1TableName,
        Token::Config2TableName,
        Token::CandidateTableName,
        Token::ParentTableName,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Token::MandInColumns => "mand_in_columns",
            Token::MandInColumnsWithQ => "mand_in_columns_with_?",
            Token::MandInColumnsEqQ => "mand_in_columns_eq_?",
            Token::OptOutColumns => "opt_out_columns",
            Token::OptOutColumnsTmp => "opt_out_columns_tmp",
            Token::OptWhereMatchColumnsEq => "opt_WHERE_match_columns_eq",
            Token::MandWhereMatchColumnsEq => "mand_WHERE_match_columns_eq",
            Token::MandWhereMatchColumnsSiblingGt => "mand_WHERE_match_columns_sibling_gt",
            Token::MandWhereMatchColumnsSiblingGe => "mand_WHERE_match_columns_sibling_ge",
            Token::OptAndMatchColumnsEqTmp => "opt_AND_match_columns_eq_tmp",
            Token::MandAndMatchColumnsEqTmp => "mand_AND_match_columns_eq_tmp",
            Token::MandAndMatchColumnsEq => "mand_AND_match_columns_eq",
            Token::OptAndMatchColumnsEqCandidate => "opt_AND_match_columns_eq_candidate",
            Token::MandWhereInstanceKeyEq => "mand_WHERE_instance_key_eq",
            Token::MandWhereParentKeyEq => "mand_WHERE_parent_key_eq",
            Token::PrimaryKeyColumns => "primary_key_columns",
            Token::PrimaryKeyColumnsTmp => "primary_key_columns_tmp",
            Token::Config1PkEqTmp => "config1_pk_eq_tmp",
            Token::Config2PkEqTmp => "config2_pk_eq_tmp",
            Token::Config1NonPkEqTmp => "config1_non_pk_eq_tmp",
            Token::Config2NonPkEqTmp => "config2_non_pk_eq_tmp",
            Token::Config2AllColsEqTmp => "config2_all_cols_eq_tmp",
            Token::Config1SetNonPkFromConfig2 => "config1_set_non_pk_from_config2",
            Token::CandidatePkEqTmp => "candidate_pk_eq_tmp",
            Token::Config1TableName => "config1_table_name",
            Token::Config2TableName => "config2_table_name",
            Token::CandidateTableName => "candidate_table_name",
            Token::ParentTableName => "parent_table_name",
        }
    }

    pub fn from_name(name: &str) -> Option<Token> {
        Token::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Piece of template text: literal SQL or a placeholder to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Token(Token),
}

/// Splits template text into literals and tokens.
pub fn scan(text: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(format!("unterminated token at '{}'", &rest[open..]));
        };
        let name = &after[..close];
        let Some(token) = Token::from_name(name) else {
            return Err(format!("unrecognized token '{{{name}}}'"));
        };
        segments.push(Segment::Token(token));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}
