//! libSQL schema.
//!
//! Every statement is `IF NOT EXISTS`, so applying the schema to an existing
//! database is a no-op.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    role TEXT NOT NULL DEFAULT 'staff',
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS case_categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_category_id TEXT REFERENCES case_categories(id),
    role_definitions TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_case_categories_parent ON case_categories(parent_category_id);

CREATE TABLE IF NOT EXISTS case_phases (
    id TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES case_categories(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    sort_order INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_case_phases_category ON case_phases(category_id, sort_order);

CREATE TABLE IF NOT EXISTS courthouses (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    postal_code TEXT,
    address1 TEXT,
    address2 TEXT,
    phone TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS court_divisions (
    id TEXT PRIMARY KEY,
    courthouse_id TEXT NOT NULL REFERENCES courthouses(id) ON DELETE CASCADE,
    parent_id TEXT REFERENCES court_divisions(id) ON DELETE SET NULL,
    name TEXT NOT NULL,
    division_type TEXT NOT NULL,
    phone TEXT,
    fax TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_court_divisions_courthouse ON court_divisions(courthouse_id);

CREATE TABLE IF NOT EXISTS court_personnel (
    id TEXT PRIMARY KEY,
    court_division_id TEXT NOT NULL REFERENCES court_divisions(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    email TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_court_personnel_division ON court_personnel(court_division_id);

CREATE TABLE IF NOT EXISTS jurisdiction_rules (
    id TEXT PRIMARY KEY,
    lower_courthouse_id TEXT NOT NULL REFERENCES courthouses(id) ON DELETE CASCADE,
    superior_courthouse_id TEXT NOT NULL REFERENCES courthouses(id) ON DELETE CASCADE,
    case_category_id TEXT REFERENCES case_categories(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (lower_courthouse_id <> superior_courthouse_id)
);
CREATE INDEX IF NOT EXISTS idx_jurisdiction_rules_lower ON jurisdiction_rules(lower_courthouse_id);
CREATE INDEX IF NOT EXISTS idx_jurisdiction_rules_superior ON jurisdiction_rules(superior_courthouse_id);

CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    case_number TEXT UNIQUE,
    status TEXT,
    trial_level TEXT,
    hourly_rate TEXT,
    first_consultation_date TEXT,
    engagement_date TEXT,
    case_closed_date TEXT,
    judgment_date TEXT,
    has_engagement_letter INTEGER NOT NULL DEFAULT 0,
    remarks TEXT,
    custom_properties TEXT NOT NULL DEFAULT '{}',
    category_id TEXT NOT NULL REFERENCES case_categories(id),
    current_phase_id TEXT REFERENCES case_phases(id),
    court_division_id TEXT REFERENCES court_divisions(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cases_category ON cases(category_id);
CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);

CREATE TABLE IF NOT EXISTS parties (
    id TEXT PRIMARY KEY,
    is_corporation INTEGER NOT NULL DEFAULT 0,
    is_former_client INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Profiles do not cascade: a party cannot be deleted while one exists.
CREATE TABLE IF NOT EXISTS individual_profiles (
    party_id TEXT PRIMARY KEY REFERENCES parties(id),
    last_name TEXT,
    first_name TEXT,
    last_name_kana TEXT,
    first_name_kana TEXT,
    honorific TEXT,
    date_of_birth TEXT,
    email TEXT,
    phone TEXT,
    mobile_phone TEXT,
    postal_code TEXT,
    address1 TEXT,
    address2 TEXT,
    company_name TEXT,
    remarks TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS corporate_profiles (
    party_id TEXT PRIMARY KEY REFERENCES parties(id),
    name TEXT,
    name_kana TEXT,
    postal_code TEXT,
    address1 TEXT,
    address2 TEXT,
    phone TEXT,
    fax TEXT,
    email TEXT,
    website_url TEXT,
    representative_title TEXT,
    representative_name TEXT,
    contact_name TEXT,
    contact_email TEXT,
    remarks TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS case_parties (
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    party_id TEXT NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (case_id, party_id, role)
);
CREATE INDEX IF NOT EXISTS idx_case_parties_party ON case_parties(party_id);

CREATE TABLE IF NOT EXISTS case_assignments (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (case_id, user_id)
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    due_date TEXT,
    assigned_to TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_case ON tasks(case_id);

CREATE TABLE IF NOT EXISTS case_events (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    date_time TEXT NOT NULL,
    location TEXT,
    title TEXT,
    description TEXT,
    created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_case_events_case ON case_events(case_id, event_type);

CREATE TABLE IF NOT EXISTS hearing_reports (
    id TEXT PRIMARY KEY,
    case_event_id TEXT NOT NULL UNIQUE REFERENCES case_events(id) ON DELETE CASCADE,
    attendees TEXT NOT NULL DEFAULT '[]',
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS submitted_documents (
    id TEXT PRIMARY KEY,
    hearing_report_id TEXT NOT NULL REFERENCES hearing_reports(id) ON DELETE CASCADE,
    document_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'Submitted',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_submitted_documents_report ON submitted_documents(hearing_report_id);

CREATE TABLE IF NOT EXISTS case_memos (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    author_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS case_ledger_entries (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('expense', 'deposit')),
    entry_date TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_case_ledger_case ON case_ledger_entries(case_id, kind);

CREATE TABLE IF NOT EXISTS law_firms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS law_firm_offices (
    id TEXT PRIMARY KEY,
    law_firm_id TEXT NOT NULL REFERENCES law_firms(id) ON DELETE CASCADE,
    is_primary INTEGER NOT NULL DEFAULT 0,
    office_name TEXT,
    postal_code TEXT,
    address1 TEXT,
    address2 TEXT,
    phone TEXT,
    fax TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lawyers (
    id TEXT PRIMARY KEY,
    last_name TEXT,
    first_name TEXT,
    last_name_kana TEXT,
    first_name_kana TEXT,
    registration_number TEXT UNIQUE,
    office_id TEXT REFERENCES law_firm_offices(id) ON DELETE SET NULL,
    phone TEXT,
    remarks TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_template_items (
    id TEXT PRIMARY KEY,
    task_template_id TEXT NOT NULL REFERENCES task_templates(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    due_date_offset_days INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS phase_transition_rules (
    id TEXT PRIMARY KEY,
    from_phase_id TEXT NOT NULL REFERENCES case_phases(id) ON DELETE CASCADE,
    to_phase_id TEXT NOT NULL REFERENCES case_phases(id) ON DELETE CASCADE,
    task_template_id TEXT REFERENCES task_templates(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (from_phase_id, to_phase_id)
);

CREATE TABLE IF NOT EXISTS timesheet_entries (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    hours TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_timesheet_user ON timesheet_entries(user_id, start_time);
CREATE INDEX IF NOT EXISTS idx_timesheet_case ON timesheet_entries(case_id, start_time);

CREATE TABLE IF NOT EXISTS document_templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    body TEXT NOT NULL,
    content_type TEXT,
    file_path TEXT,
    placeholders TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notices (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    message TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notices_user ON notices(user_id, is_read);

-- Single-table key-value items for the notification service.
CREATE TABLE IF NOT EXISTS kv_items (
    table_name TEXT NOT NULL,
    pk TEXT NOT NULL,
    sk TEXT NOT NULL,
    gsi1pk TEXT,
    gsi1sk TEXT,
    gsi2pk TEXT,
    gsi2sk TEXT,
    gsi3pk TEXT,
    gsi3sk TEXT,
    gsi4pk TEXT,
    gsi4sk TEXT,
    ttl INTEGER,
    attrs TEXT NOT NULL,
    PRIMARY KEY (table_name, pk, sk)
);
CREATE INDEX IF NOT EXISTS idx_kv_gsi1 ON kv_items(table_name, gsi1pk, gsi1sk);
CREATE INDEX IF NOT EXISTS idx_kv_gsi2 ON kv_items(table_name, gsi2pk, gsi2sk);
CREATE INDEX IF NOT EXISTS idx_kv_gsi3 ON kv_items(table_name, gsi3pk, gsi3sk);
CREATE INDEX IF NOT EXISTS idx_kv_gsi4 ON kv_items(table_name, gsi4pk, gsi4sk);
CREATE INDEX IF NOT EXISTS idx_kv_ttl ON kv_items(ttl);
"#;
