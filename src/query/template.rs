use crate::catalog::ConfigVersion;

/// Canonical statement templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTemplateId {
    GetSingleRecord,
    GetMultipleRecords,
    RecordExists,
    GetRecordCount,
    GetSiblingBegin,
    GetSiblingRecords,
    GetSiblingCountBegin,
    GetSiblingCount,
    InstanceExists,
    ParentExists,
    CreateRecord,
    CreateRecordWithCFlag,
    CreateRecordWithUFlag,
    UpdateRecord,
    UpdateRecordWithUFlag,
    DeleteRecords,
    TruncateTable,
    CopyEntireRecords,
    CopyMatchingRecords,
    CopyDeletedToShadow,
    CopyModifiedCreate,
    CopyModifiedUpdate,
    CopyModifiedDelete,
    CopyModifiedCreateVtn,
    CopyModifiedUpdateVtn,
    CopyModifiedDeleteVtn,
    CopyModifiedCreateImport,
    CopyModifiedUpdateImport,
    CopyModifiedCreateAbort,
    CopyModifiedUpdateAbort,
    DiffCreatedRecords,
    DiffUpdatedRecords,
    DiffDeletedRecords,
    DiffDeletedFromShadow,
    DiffMismatchCount,
    DirtyFlagReset,
    DirtyFlagClear,
}

impl QueryTemplateId {
    pub const ALL: [QueryTemplateId; 37] = [
        QueryTemplateId::GetSingleRecord,
        QueryTemplateId::GetMultipleRecords,
        QueryTemplateId::RecordExists,
        QueryTemplateId::GetRecordCount,
        QueryTemplateId::GetSiblingBegin,
        QueryTemplateId::GetSiblingRecords,
        QueryTemplateId::GetSiblingCountBegin,
        QueryTemplateId::GetSiblingCount,
        QueryTemplateId::InstanceExists,
        QueryTemplateId::ParentExists,
        QueryTemplateId::CreateRecord,
        QueryTemplateId::CreateRecordWithCFlag,
        QueryTemplateId::CreateRecordWithUFlag,
        QueryTemplateId::UpdateRecord,
        QueryTemplateId::UpdateRecordWithUFlag,
        QueryTemplateId::DeleteRecords,
        QueryTemplateId::TruncateTable,
        QueryTemplateId::CopyEntireRecords,
        QueryTemplateId::CopyMatchingRecords,
        QueryTemplateId::CopyDeletedToShadow,
        QueryTemplateId::CopyModifiedCreate,
        QueryTemplateId::CopyModifiedUpdate,
        QueryTemplateId::CopyModifiedDelete,
        QueryTemplateId::CopyModifiedCreateVtn,
        QueryTemplateId::CopyModifiedUpdateVtn,
        QueryTemplateId::CopyModifiedDeleteVtn,
        QueryTemplateId::CopyModifiedCreateImport,
        QueryTemplateId::CopyModifiedUpdateImport,
        QueryTemplateId::CopyModifiedCreateAbort,
        QueryTemplateId::CopyModifiedUpdateAbort,
        QueryTemplateId::DiffCreatedRecords,
        QueryTemplateId::DiffUpdatedRecords,
        QueryTemplateId::DiffDeletedRecords,
        QueryTemplateId::DiffDeletedFromShadow,
        QueryTemplateId::DiffMismatchCount,
        QueryTemplateId::DirtyFlagReset,
        QueryTemplateId::DirtyFlagClear,
    ];

    /// Template text. `tmp` aliases the correlated row of a copy or diff;
    /// config1 is the destination (or the side being reported), config2 the
    /// other version.
    pub fn text(self) -> &'static str {
        match self {
            QueryTemplateId::GetSingleRecord => {
                "SELECT {opt_out_columns} FROM {config1_table_name} {mand_WHERE_match_columns_eq}"
            }
            QueryTemplateId::GetMultipleRecords => {
                "SELECT {opt_out_columns} FROM {config1_table_name} {opt_WHERE_match_columns_eq} \
                 ORDER BY {primary_key_columns}"
            }
            QueryTemplateId::RecordExists => {
                "SELECT 1 FROM {config1_table_name} {opt_WHERE_match_columns_eq} LIMIT 1"
            }
            QueryTemplateId::GetRecordCount => {
                "SELECT COUNT(*) FROM {config1_table_name} {opt_WHERE_match_columns_eq}"
            }
            QueryTemplateId::GetSiblingBegin => {
                "SELECT {opt_out_columns} FROM {config1_table_name} \
                 {mand_WHERE_match_columns_sibling_ge} ORDER BY {primary_key_columns}"
            }
            QueryTemplateId::GetSiblingRecords => {
                "SELECT {opt_out_columns} FROM {config1_table_name} \
                 {mand_WHERE_match_columns_sibling_gt} ORDER BY {primary_key_columns}"
            }
            QueryTemplateId::GetSiblingCountBegin => {
                "SELECT COUNT(*) FROM {config1_table_name} {mand_WHERE_match_columns_sibling_ge}"
            }
            QueryTemplateId::GetSiblingCount => {
                "SELECT COUNT(*) FROM {config1_table_name} {mand_WHERE_match_columns_sibling_gt}"
            }
            QueryTemplateId::InstanceExists => {
                "SELECT 1 FROM {config1_table_name} {mand_WHERE_instance_key_eq} LIMIT 1"
            }
            QueryTemplateId::ParentExists => {
                "SELECT 1 FROM {parent_table_name} {mand_WHERE_parent_key_eq} LIMIT 1"
            }
            QueryTemplateId::CreateRecord => {
                "INSERT INTO {config1_table_name} ({mand_in_columns}) \
                 VALUES ({mand_in_columns_with_?})"
            }
            QueryTemplateId::CreateRecordWithCFlag => {
                "INSERT INTO {config1_table_name} ({mand_in_columns}, c_flag) \
                 VALUES ({mand_in_columns_with_?}, 1)"
            }
            QueryTemplateId::CreateRecordWithUFlag => {
                "INSERT INTO {config1_table_name} ({mand_in_columns}, u_flag) \
                 VALUES ({mand_in_columns_with_?}, 1)"
            }
            QueryTemplateId::UpdateRecord => {
                "UPDATE {config1_table_name} SET {mand_in_columns_eq_?} \
                 {opt_WHERE_match_columns_eq}"
            }
            QueryTemplateId::UpdateRecordWithUFlag => {
                "UPDATE {config1_table_name} SET {mand_in_columns_eq_?}, u_flag = 1 \
                 {opt_WHERE_match_columns_eq}"
            }
            QueryTemplateId::DeleteRecords => {
                "DELETE FROM {config1_table_name} {opt_WHERE_match_columns_eq}"
            }
            QueryTemplateId::TruncateTable => "DELETE FROM {config1_table_name}",
            QueryTemplateId::CopyEntireRecords => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}) \
                 SELECT {opt_out_columns} FROM {config2_table_name}"
            }
            QueryTemplateId::CopyMatchingRecords => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}) \
                 SELECT {opt_out_columns} FROM {config2_table_name} {mand_WHERE_match_columns_eq}"
            }
            QueryTemplateId::CopyDeletedToShadow => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}) \
                 SELECT {opt_out_columns_tmp} FROM {config2_table_name} tmp \
                 WHERE EXISTS (SELECT 1 FROM {candidate_table_name} \
                 WHERE {candidate_pk_eq_tmp} {opt_AND_match_columns_eq_candidate}) \
                 AND NOT EXISTS (SELECT 1 FROM {config1_table_name} WHERE {config1_pk_eq_tmp})"
            }
            QueryTemplateId::CopyModifiedCreate => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}) \
                 SELECT {opt_out_columns_tmp} FROM {config2_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config1_table_name} WHERE {config1_pk_eq_tmp})"
            }
            QueryTemplateId::CopyModifiedUpdate => {
                "UPDATE {config1_table_name} SET {config1_set_non_pk_from_config2} \
                 WHERE EXISTS (SELECT 1 FROM {config2_table_name} tmp \
                 WHERE {config1_pk_eq_tmp} AND NOT ({config1_non_pk_eq_tmp}))"
            }
            QueryTemplateId::CopyModifiedDelete => {
                "DELETE FROM {config1_table_name} \
                 WHERE NOT EXISTS (SELECT 1 FROM {config2_table_name} tmp WHERE {config1_pk_eq_tmp})"
            }
            QueryTemplateId::CopyModifiedCreateVtn => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}) \
                 SELECT {opt_out_columns_tmp} FROM {config2_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config1_table_name} WHERE {config1_pk_eq_tmp}) \
                 {mand_AND_match_columns_eq_tmp}"
            }
            QueryTemplateId::CopyModifiedUpdateVtn => {
                "UPDATE {config1_table_name} SET {config1_set_non_pk_from_config2} \
                 WHERE EXISTS (SELECT 1 FROM {config2_table_name} tmp \
                 WHERE {config1_pk_eq_tmp} AND NOT ({config1_non_pk_eq_tmp})) \
                 {mand_AND_match_columns_eq}"
            }
            QueryTemplateId::CopyModifiedDeleteVtn => {
                "DELETE FROM {config1_table_name} \
                 WHERE NOT EXISTS (SELECT 1 FROM {config2_table_name} tmp WHERE {config1_pk_eq_tmp}) \
                 {mand_AND_match_columns_eq}"
            }
            QueryTemplateId::CopyModifiedCreateImport => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}, c_flag) \
                 SELECT {opt_out_columns_tmp}, 1 FROM {config2_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config1_table_name} WHERE {config1_pk_eq_tmp})"
            }
            QueryTemplateId::CopyModifiedUpdateImport => {
                "UPDATE {config1_table_name} SET {config1_set_non_pk_from_config2}, u_flag = 1 \
                 WHERE EXISTS (SELECT 1 FROM {config2_table_name} tmp \
                 WHERE {config1_pk_eq_tmp} AND NOT ({config1_non_pk_eq_tmp}))"
            }
            QueryTemplateId::CopyModifiedCreateAbort => {
                "INSERT INTO {config1_table_name} ({opt_out_columns}, c_flag, u_flag) \
                 SELECT {opt_out_columns_tmp}, 0, 0 FROM {config2_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config1_table_name} WHERE {config1_pk_eq_tmp})"
            }
            QueryTemplateId::CopyModifiedUpdateAbort => {
                "UPDATE {config1_table_name} \
                 SET {config1_set_non_pk_from_config2}, c_flag = 0, u_flag = 0 \
                 WHERE EXISTS (SELECT 1 FROM {config2_table_name} tmp \
                 WHERE {config1_pk_eq_tmp} AND NOT ({config1_non_pk_eq_tmp}))"
            }
            QueryTemplateId::DiffCreatedRecords => {
                "SELECT {opt_out_columns_tmp} FROM {config1_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config2_table_name} WHERE {config2_pk_eq_tmp}) \
                 {opt_AND_match_columns_eq_tmp} ORDER BY {primary_key_columns_tmp}"
            }
            QueryTemplateId::DiffUpdatedRecords => {
                "SELECT {opt_out_columns_tmp} FROM {config1_table_name} tmp \
                 WHERE EXISTS (SELECT 1 FROM {config2_table_name} \
                 WHERE {config2_pk_eq_tmp} AND NOT ({config2_non_pk_eq_tmp})) \
                 {opt_AND_match_columns_eq_tmp} ORDER BY {primary_key_columns_tmp}"
            }
            QueryTemplateId::DiffDeletedRecords => {
                "SELECT {opt_out_columns_tmp} FROM {config2_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config1_table_name} WHERE {config1_pk_eq_tmp}) \
                 {opt_AND_match_columns_eq_tmp} ORDER BY {primary_key_columns_tmp}"
            }
            QueryTemplateId::DiffDeletedFromShadow => {
                "SELECT {opt_out_columns_tmp} FROM {config1_table_name} tmp \
                 WHERE EXISTS (SELECT 1 FROM {config2_table_name} WHERE {config2_pk_eq_tmp}) \
                 AND NOT EXISTS (SELECT 1 FROM {candidate_table_name} WHERE {candidate_pk_eq_tmp}) \
                 {opt_AND_match_columns_eq_tmp} ORDER BY {primary_key_columns_tmp}"
            }
            QueryTemplateId::DiffMismatchCount => {
                "SELECT COUNT(*) FROM {config1_table_name} tmp \
                 WHERE NOT EXISTS (SELECT 1 FROM {config2_table_name} \
                 WHERE {config2_all_cols_eq_tmp}) {opt_AND_match_columns_eq_tmp}"
            }
            QueryTemplateId::DirtyFlagReset => {
                "UPDATE {config1_table_name} SET c_flag = 0, u_flag = 0 \
                 {mand_WHERE_match_columns_eq}"
            }
            QueryTemplateId::DirtyFlagClear => {
                "UPDATE {config1_table_name} SET c_flag = 0, u_flag = 0 \
                 WHERE c_flag <> 0 OR u_flag <> 0"
            }
        }
    }

    pub fn requires_two_versions(self) -> bool {
        matches!(
            self,
            QueryTemplateId::CopyEntireRecords
                | QueryTemplateId::CopyMatchingRecords
                | QueryTemplateId::CopyDeletedToShadow
                | QueryTemplateId::CopyModifiedCreate
                | QueryTemplateId::CopyModifiedUpdate
                | QueryTemplateId::CopyModifiedDelete
                | QueryTemplateId::CopyModifiedCreateVtn
                | QueryTemplateId::CopyModifiedUpdateVtn
                | QueryTemplateId::CopyModifiedDeleteVtn
                | QueryTemplateId::CopyModifiedCreateImport
                | QueryTemplateId::CopyModifiedUpdateImport
                | QueryTemplateId::CopyModifiedCreateAbort
                | QueryTemplateId::CopyModifiedUpdateAbort
                | QueryTemplateId::DiffCreatedRecords
                | QueryTemplateId::DiffUpdatedRecords
                | QueryTemplateId::DiffDeletedRecords
                | QueryTemplateId::DiffDeletedFromShadow
                | QueryTemplateId::DiffMismatchCount
        )
    }

    /// Version the first table must belong to, for templates touching the
    /// CANDIDATE-only flag columns or the delete shadow.
    pub fn required_version_a(self) -> Option<ConfigVersion> {
        match self {
            QueryTemplateId::CreateRecordWithCFlag
            | QueryTemplateId::CreateRecordWithUFlag
            | QueryTemplateId::UpdateRecordWithUFlag
            | QueryTemplateId::CopyModifiedCreateImport
            | QueryTemplateId::CopyModifiedUpdateImport
            | QueryTemplateId::CopyModifiedCreateAbort
            | QueryTemplateId::CopyModifiedUpdateAbort
            | QueryTemplateId::DirtyFlagReset
            | QueryTemplateId::DirtyFlagClear => Some(ConfigVersion::Candidate),
            QueryTemplateId::CopyDeletedToShadow | QueryTemplateId::DiffDeletedFromShadow => {
                Some(ConfigVersion::CandidateDel)
            }
            _ => None,
        }
    }

    pub fn requires_candidate(self) -> bool {
        self.required_version_a() == Some(ConfigVersion::Candidate)
    }

    /// Statements that return rows.
    pub fn is_select(self) -> bool {
        self.text().starts_with("SELECT")
    }
}
