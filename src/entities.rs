//! Entity registry.
//!
//! Every business table is described once here: its SQL table, the API
//! route segment, the ordered column list and the rule applied on create.
//! The repository, the HTTP handlers, the spreadsheet loaders and the
//! exporter are all driven from these descriptors.
//!
//! Column aliases are the spreadsheet header spellings accepted on import,
//! in priority order. The first alias is also the header written on export,
//! so an exported file loads back through the same descriptor.

use crate::registration::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// ISO `YYYY-MM-DD` text. Spreadsheet serials are converted on import;
    /// free text (e.g. a month name) is kept as written.
    Date,
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub aliases: &'static [&'static str],
}

impl Column {
    /// JSON key used by the API (camelCase of the column name).
    pub fn key(&self) -> String {
        camel_case(self.name)
    }

    /// Header written on export.
    pub fn header(&self) -> &'static str {
        self.aliases.first().copied().unwrap_or(self.name)
    }
}

const fn text(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
        aliases,
    }
}

const fn integer(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        kind: ColumnKind::Integer,
        aliases,
    }
}

const fn real(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        kind: ColumnKind::Real,
        aliases,
    }
}

const fn date(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        kind: ColumnKind::Date,
        aliases,
    }
}

/// What `POST` does for an entity beyond inserting the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateRule {
    Plain,
    /// Registration stage table guarded by the duplicate-passport check.
    Stage(Stage),
    /// Student roster: passport number required and unique.
    Student,
    /// Agent: name required and unique (case-insensitive).
    Agent,
    /// Agent bonus: must reference an existing agent.
    AgentBonus,
}

/// Read-only columns maintained by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemColumns {
    None,
    /// `sheet_type` stage tag.
    StageTag,
    /// `created_at` / `updated_at`.
    Timestamps,
}

#[derive(Debug)]
pub struct Entity {
    pub table: &'static str,
    pub route: &'static str,
    pub export_file: &'static str,
    pub columns: &'static [Column],
    pub create_rule: CreateRule,
    pub system: SystemColumns,
}

impl Entity {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the read-only columns present on this table.
    pub fn system_columns(&self) -> &'static [&'static str] {
        match self.system {
            SystemColumns::None => &[],
            SystemColumns::StageTag => &["sheet_type"],
            SystemColumns::Timestamps => &["created_at", "updated_at"],
        }
    }

    /// Dataset name used by export and import (`registration/val-approved`
    /// becomes `registration-val-approved`).
    pub fn dataset(&self) -> String {
        self.route.replace('/', "-")
    }

    pub fn stage(&self) -> Option<Stage> {
        match self.create_rule {
            CreateRule::Stage(stage) => Some(stage),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared columns
// ---------------------------------------------------------------------------

const NO: Column = integer("no", &["No", "No.", "#"]);
const NAME: Column = text("name", &["Name", "Student Name"]);
const UNI: Column = text("uni", &["Uni", "University"]);
const PROGRAM: Column = text("program", &["Program", "Programme"]);
const PASSPORT: Column = text(
    "passport_number",
    &["Passport Number", "Pass No.", "Passport No", "Passport"],
);
const NATIONALITY: Column = text("nationality", &["Nationality"]);
const VISA: Column = text("visa", &["Visa"]);
const COUNSELOR: Column = text("counselor", &["Counselor", "Counsellor"]);
const MONTH: Column = text("month", &["Month"]);
const DATE: Column = date("date", &["Date"]);
const AMOUNT: Column = real("amount", &["Amount"]);
const REF: Column = text("ref", &["Reference", "Ref", "REF"]);
const CURRENCY: Column = text("currency", &["Currency"]);
const TYPE: Column = text("type", &["Type"]);
const NOTE: Column = text("note", &["Note", "Notes"]);
const SUBMISSION_MONTH: Column = date("submission_month", &["Submission Month"]);
const PAID_MONTH: Column = date("paid_month", &["Paid Month"]);
const STAGE_MONTH: Column = date("month", &["Month"]);
const PAYMENT: Column = text("payment", &["Payment"]);
const DR_HANI_ACCOUNT: Column = text("dr_hani_account", &["Dr Hani Account"]);
const RECEIVED_DATE: Column = date("received_date", &["Received Date"]);

const BONUS_COLUMNS: [Column; 13] = [
    NO,
    NAME,
    UNI,
    PASSPORT,
    NATIONALITY,
    VISA,
    COUNSELOR,
    PROGRAM,
    date("intake", &["Intake"]),
    text(
        "tuition_fees_payment",
        &["Tuition Fees Payment", "Tutition fees Payment"],
    ),
    text("enrollment", &["Enrollment"]),
    text("commission", &["Commission"]),
    real("usd", &["USD"]),
];

const fn plain(
    table: &'static str,
    route: &'static str,
    export_file: &'static str,
    columns: &'static [Column],
) -> Entity {
    Entity {
        table,
        route,
        export_file,
        columns,
        create_rule: CreateRule::Plain,
        system: SystemColumns::None,
    }
}

const fn stage(
    stage: Stage,
    route: &'static str,
    export_file: &'static str,
    columns: &'static [Column],
) -> Entity {
    Entity {
        table: stage.table(),
        route,
        export_file,
        columns,
        create_rule: CreateRule::Stage(stage),
        system: SystemColumns::StageTag,
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub static ENTITIES: &[Entity] = &[
    // Finance
    plain(
        "abeer",
        "abeer",
        "ABEER_2025.xlsx",
        &[
            // The source sheet leaves the month column header blank.
            text("month", &["Month", ""]),
            real("income_malaysia", &["Income Malaysia"]),
            real("total_income", &["Total Income"]),
            real("malaysia_office", &["Malaysia Office"]),
            real("salaries", &["Salaries"]),
            real("sub_agent", &["Sub Agent"]),
            real("social_media", &["Social Media"]),
            real("total_outcome", &["Total Outcome"]),
        ],
    ),
    plain(
        "data",
        "data-records",
        "DATA_2025.xlsx",
        &[MONTH, NO, NAME, UNI, PROGRAM],
    ),
    plain(
        "commission",
        "commission",
        "COMMISSION_24.xlsx",
        &[
            NO,
            text("university", &["University", "Uni"]),
            REF,
            MONTH,
            real("other_income", &["Other Income"]),
            RECEIVED_DATE,
            CURRENCY,
            AMOUNT,
            date("invoice_date", &["Invoice Date"]),
            text("notes", &["Notes", "Note"]),
        ],
    ),
    plain(
        "invoice",
        "invoices",
        "INVOICES.xlsx",
        &[NO, UNI, TYPE, DATE],
    ),
    plain(
        "sent_invoice",
        "sent-invoices",
        "SENT_INVOICES.xlsx",
        &[
            NO,
            UNI,
            TYPE,
            DATE,
            DR_HANI_ACCOUNT,
            CURRENCY,
            AMOUNT,
            text("apply_uni", &["Apply Uni"]),
        ],
    ),
    plain(
        "ucsi",
        "ucsi",
        "UCSI.xlsx",
        &[NO, UNI, TYPE, DATE, DR_HANI_ACCOUNT, CURRENCY, AMOUNT],
    ),
    plain(
        "ucsi_invoice",
        "ucsi-invoices",
        "UCSI_INVOICES.xlsx",
        &[NO, UNI, TYPE, DATE, CURRENCY, AMOUNT, RECEIVED_DATE],
    ),
    plain(
        "income_outcome",
        "incomeoutcome",
        "INCOME_OUTCOME.xlsx",
        &[
            NO,
            DATE,
            real("income", &["Income"]),
            real("office", &["Office"]),
            real("salaries", &["Salaries"]),
            real("subagent", &["Sub Agent", "Subagent"]),
            real("socialmedia", &["Social Media", "Socialmedia"]),
            real("outcome", &["Outcome"]),
            text("country", &["Country"]),
        ],
    ),
    plain(
        "adv_bill",
        "adv-bills",
        "ADV_BILLS_2025_2026.xlsx",
        // The source workbook uses its first amount as the header.
        &[real("amount", &["Amount", "RM1,500.00"])],
    ),
    plain(
        "subagent",
        "subagent",
        "SUBAGENT_2025_2026.xlsx",
        &[
            NO,
            text("subagent_name", &["Subagent Name", "Sub Agent Name"]),
            DATE,
            REF,
            text("referral_commission_on", &["Referral Commission On"]),
            AMOUNT,
            MONTH,
        ],
    ),
    // Bonus
    plain("bonus", "bonus", "BONUS_2024.xlsx", &BONUS_COLUMNS),
    plain(
        "bonus_claimed",
        "bonus/claimed",
        "BONUS_CLAIMED_2024.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            COUNSELOR,
            PROGRAM,
            date("intake", &["Intake"]),
            text(
                "tuition_fees_payment",
                &["Tuition Fees Payment", "Tutition fees Payment"],
            ),
            text("enrollment", &["Enrollment"]),
            text("commission", &["Commission"]),
            real("rm", &["RM"]),
            real("usd", &["USD"]),
            date("claimed_date", &["Claimed Date"]),
            text("claimed_by", &["Claimed By"]),
        ],
    ),
    plain(
        "bonus_not_claimed",
        "bonus/not-claimed",
        "BONUS_NOT_CLAIMED_2024.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            COUNSELOR,
            PROGRAM,
            date("intake", &["Intake"]),
            text(
                "tuition_fees_payment",
                &["Tuition Fees Payment", "Tutition fees Payment"],
            ),
            text("enrollment", &["Enrollment"]),
            text("commission", &["Commission"]),
            real("rm", &["RM"]),
            real("usd", &["USD"]),
        ],
    ),
    Entity {
        table: "agent",
        route: "agents",
        export_file: "AGENTS.xlsx",
        columns: &[text("name", &["Name", "Agent"])],
        create_rule: CreateRule::Agent,
        system: SystemColumns::Timestamps,
    },
    Entity {
        table: "agent_bonus",
        route: "agent-bonuses",
        export_file: "AGENT_BONUS.xlsx",
        columns: &[
            text("agent_id", &["Agent Id"]),
            text("student_name", &["Student Name", "Name"]),
            UNI,
            PROGRAM,
            MONTH,
            text("enrollment", &["Enrollment", "Enrollment Status"]),
            real("enrollment_bonus", &["Enrollment Bonus"]),
            real("visa_bonus", &["Visa Bonus"]),
            text("commission_from_uni", &["Commission From Uni"]),
        ],
        create_rule: CreateRule::AgentBonus,
        system: SystemColumns::Timestamps,
    },
    // Registration
    Entity {
        table: "registration",
        route: "registration",
        export_file: "REGISTRATION_2025.xlsx",
        columns: &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            date("val_approval", &["VAL Approval"]),
            COUNSELOR,
            PROGRAM,
            SUBMISSION_MONTH,
            PAID_MONTH,
            date("arrival_date", &["Arrival Date"]),
        ],
        create_rule: CreateRule::Plain,
        system: SystemColumns::StageTag,
    },
    stage(
        Stage::ValApproved,
        "registration/val-approved",
        "REGISTRATION_VAL_APPROVED_2025.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            date("val_approval", &["VAL Approval"]),
            COUNSELOR,
            PROGRAM,
            SUBMISSION_MONTH,
            PAID_MONTH,
            date("arrival_date", &["Arrival Date"]),
            NOTE,
        ],
    ),
    stage(
        Stage::Enrollment,
        "registration/enrollment",
        "REGISTRATION_ENROLLMENT_2025.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            COUNSELOR,
            PROGRAM,
            date("intake", &["Intake"]),
            SUBMISSION_MONTH,
            PAID_MONTH,
        ],
    ),
    stage(
        Stage::VisaProcess,
        "registration/visa-process",
        "REGISTRATION_VISA_PROCESS_2025.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            COUNSELOR,
            PROGRAM,
            SUBMISSION_MONTH,
            PAID_MONTH,
            NOTE,
        ],
    ),
    stage(
        Stage::NotSubmitted,
        "registration/not-submitted",
        "REGISTRATION_NOT_SUBMITTED_2025.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            COUNSELOR,
            PROGRAM,
            STAGE_MONTH,
            PAYMENT,
        ],
    ),
    stage(
        Stage::Cancelled,
        "registration/cancelled",
        "REGISTRATION_CANCELLED_2025.xlsx",
        &[
            NO,
            NAME,
            UNI,
            PASSPORT,
            NATIONALITY,
            VISA,
            COUNSELOR,
            PROGRAM,
            STAGE_MONTH,
            PAYMENT,
        ],
    ),
    Entity {
        table: "student",
        route: "students",
        export_file: "STUDENTS.xlsx",
        columns: &[PASSPORT, NAME, NATIONALITY, UNI, PROGRAM, COUNSELOR],
        create_rule: CreateRule::Student,
        system: SystemColumns::Timestamps,
    },
    // Events and office expenses
    plain(
        "events",
        "events",
        "EVENTS.xlsx",
        &[
            NO,
            DATE,
            UNI,
            CURRENCY,
            real("income", &["Income"]),
            real("expenses", &["Expenses"]),
            text("country", &["Country"]),
        ],
    ),
    plain(
        "salaries",
        "salaries",
        "SALARIES.xlsx",
        &[NO, NAME, AMOUNT, DATE],
    ),
    plain(
        "services",
        "services",
        "SERVICES.xlsx",
        &[NO, NAME, DATE, AMOUNT],
    ),
    plain(
        "trip_travel_bonus",
        "trip-travel-bonus",
        "TRIP_TRAVEL_BONUS.xlsx",
        &[NO, NAME, AMOUNT, DATE],
    ),
    plain(
        "employee_visa",
        "employee-visa",
        "EMPLOYEE_VISA.xlsx",
        &[
            NO,
            text("employee_name", &["Employee Name"]),
            AMOUNT,
            DATE,
            REF,
        ],
    ),
    plain(
        "money_transfer",
        "money-transfer",
        "MONEY_TRANSFER.xlsx",
        &[NO, AMOUNT, DATE, REF],
    ),
    plain("rent", "rent", "RENT.xlsx", &[AMOUNT, DATE, REF]),
    plain(
        "lawyer_tax_contract",
        "lawyer-tax-contract",
        "LAWYER_TAX_CONTRACT.xlsx",
        &[AMOUNT, DATE, REF],
    ),
    plain("bills", "bills", "BILLS.xlsx", &[AMOUNT, DATE, REF]),
    plain(
        "maintenance",
        "maintenance",
        "MAINTENANCE.xlsx",
        &[AMOUNT, DATE, REF],
    ),
    plain(
        "medical_expenses",
        "medical-expenses",
        "MEDICAL_EXPENSES.xlsx",
        &[AMOUNT, DATE, REF],
    ),
    plain(
        "general_expenses",
        "general-expenses",
        "GENERAL_EXPENSES.xlsx",
        &[AMOUNT, DATE, REF],
    ),
    plain(
        "social_media",
        "social-media",
        "SOCIAL_MEDIA.xlsx",
        &[AMOUNT, DATE, REF],
    ),
    // Procedure for receiving students
    plain(
        "student_hotel",
        "student-hotel",
        "STUDENT_HOTEL.xlsx",
        &[NO, NAME, DATE, AMOUNT],
    ),
    plain(
        "student_flight_ticket",
        "student-flight-ticket",
        "STUDENT_FLIGHT_TICKET.xlsx",
        &[NO, NAME, DATE, AMOUNT],
    ),
    plain(
        "authentication_papers",
        "authentication-papers",
        "AUTHENTICATION_PAPERS.xlsx",
        &[
            NO,
            AMOUNT,
            REF,
            DATE,
            text("ref1", &["Reference 1", "Ref1", "Ref 1"]),
        ],
    ),
    plain(
        "student_visa",
        "student-visa",
        "STUDENT_VISA.xlsx",
        &[NO, AMOUNT, DATE, REF, UNI],
    ),
    plain(
        "application_fees",
        "application-fees",
        "APPLICATION_FEES.xlsx",
        &[NO, AMOUNT, DATE, REF, UNI],
    ),
    plain(
        "airline_tickets",
        "airline-tickets",
        "AIRLINE_TICKETS.xlsx",
        &[NO, AMOUNT, DATE, REF],
    ),
];

/// Look up an entity by table name, route, or dataset name. Dashes and
/// underscores are interchangeable (`adv-bill` finds `adv_bill`).
pub fn find(name: &str) -> Option<&'static Entity> {
    let wanted = name.trim().to_ascii_lowercase();
    let as_table = wanted.replace('-', "_");
    ENTITIES.iter().find(|e| {
        e.table == as_table || e.route == wanted || e.dataset() == wanted
    })
}

/// Look up an entity by its SQL table name.
pub fn by_table(table: &str) -> Option<&'static Entity> {
    ENTITIES.iter().find(|e| e.table == table)
}

/// `passport_number` -> `passportNumber`.
pub fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("passport_number"), "passportNumber");
        assert_eq!(camel_case("ref1"), "ref1");
        assert_eq!(camel_case("dr_hani_account"), "drHaniAccount");
        assert_eq!(camel_case("no"), "no");
    }

    #[test]
    fn test_registry_names_are_unique() {
        let tables: HashSet<_> = ENTITIES.iter().map(|e| e.table).collect();
        let routes: HashSet<_> = ENTITIES.iter().map(|e| e.route).collect();
        assert_eq!(tables.len(), ENTITIES.len());
        assert_eq!(routes.len(), ENTITIES.len());
    }

    #[test]
    fn test_every_entity_has_columns_with_aliases() {
        for entity in ENTITIES {
            assert!(!entity.columns.is_empty(), "{} has no columns", entity.table);
            let mut seen = HashSet::new();
            for column in entity.columns {
                assert!(
                    seen.insert(column.name),
                    "{} repeats column {}",
                    entity.table,
                    column.name
                );
                assert!(
                    !column.header().is_empty(),
                    "{}.{} has an empty export header",
                    entity.table,
                    column.name
                );
            }
        }
    }

    #[test]
    fn test_find_accepts_table_route_and_dataset() {
        assert_eq!(find("adv-bill").map(|e| e.table), Some("adv_bill"));
        assert_eq!(find("adv-bills").map(|e| e.table), Some("adv_bill"));
        assert_eq!(
            find("registration-val-approved").map(|e| e.table),
            Some("registration_val_approved")
        );
        assert_eq!(
            find("bonus-claimed").map(|e| e.table),
            Some("bonus_claimed")
        );
        assert_eq!(find("agent-bonus").map(|e| e.table), Some("agent_bonus"));
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_stage_entities_match_stage_tables() {
        for stage in Stage::ALL {
            let entity = by_table(stage.table()).expect("stage table registered");
            assert_eq!(entity.stage(), Some(stage));
            assert_eq!(entity.system_columns(), &["sheet_type"]);
        }
    }
}
