//! Built-in collection descriptors.

use crate::schema::{DefaultValue, FieldKind, FieldSpec, Format, IdScheme, Schema};

/// Header aliases shared by every collection. Keys are already normalized
/// (lower-case, underscores).
pub const COMMON_ALIASES: &[(&str, &str)] = &[
    ("email", "contact_info_email"),
    ("email_address", "contact_info_email"),
    ("e_mail", "contact_info_email"),
    ("mail", "contact_info_email"),
    ("phone", "contact_info_phone"),
    ("phone_number", "contact_info_phone"),
    ("phone_no", "contact_info_phone"),
    ("mobile", "contact_info_phone"),
    ("contact_number", "contact_info_phone"),
    ("address", "contact_info_address"),
    ("city", "contact_info_city"),
    ("state", "contact_info_state"),
    ("country", "contact_info_country"),
    ("postal_code", "contact_info_postal_code"),
    ("pincode", "contact_info_postal_code"),
    ("pin_code", "contact_info_postal_code"),
    ("zip", "contact_info_postal_code"),
    ("zip_code", "contact_info_postal_code"),
    ("website", "contact_info_website"),
    ("web", "contact_info_website"),
    ("url", "contact_info_website"),
    ("active", "is_active"),
];

fn metadata() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text("created_at").default_to(DefaultValue::Now),
        FieldSpec::text("created_by"),
        FieldSpec::text("updated_at").default_to(DefaultValue::Now),
        FieldSpec::text("updated_by"),
    ]
}

pub fn entities() -> Schema {
    let mut fields = vec![
        FieldSpec::text("id"),
        FieldSpec::text("name").required(),
        FieldSpec::text("code").required(),
        FieldSpec::text("type").required(),
        FieldSpec::text("description"),
        FieldSpec::text("contact_info.email")
            .required()
            .format(Format::Email),
        FieldSpec::text("contact_info.phone").format(Format::Phone),
        FieldSpec::text("contact_info.website").format(Format::Url),
        FieldSpec::text("contact_info.address"),
        FieldSpec::text("contact_info.city"),
        FieldSpec::text("contact_info.state"),
        FieldSpec::text("contact_info.postal_code").format(Format::PostalCode),
        FieldSpec::text("contact_info.country"),
        FieldSpec::auto("academic_info.established_year").default_to(DefaultValue::CurrentYear),
        FieldSpec::text("academic_info.accreditation"),
        FieldSpec::text("academic_info.affiliation"),
        FieldSpec::list("academic_info.programs_offered"),
        FieldSpec::auto("academic_info.capacity"),
        FieldSpec::new("is_active", FieldKind::Boolean).default_to(DefaultValue::True),
        FieldSpec::list("tags"),
    ];
    fields.extend(metadata());
    Schema {
        name: "entities",
        resource: "entity.json",
        write_endpoint: "/api/entities/write",
        id_field: "id",
        ids: IdScheme {
            prefix: "INST",
            width: 4,
            floor: 1001,
        },
        name_field: "name",
        groups: vec!["contact_info", "academic_info"],
        fields,
        unique: vec!["code", "contact_info.email"],
        identity: vec!["code", "name"],
        aliases: vec![
            ("entity_id", "id"),
            ("institution_id", "id"),
            ("entity_name", "name"),
            ("institution_name", "name"),
            ("institution", "name"),
            ("entity_code", "code"),
            ("institution_code", "code"),
            ("entity_type", "type"),
            ("institution_type", "type"),
            ("established", "academic_info_established_year"),
            ("established_year", "academic_info_established_year"),
            ("year_established", "academic_info_established_year"),
            ("accreditation", "academic_info_accreditation"),
            ("affiliation", "academic_info_affiliation"),
            ("affiliated_to", "academic_info_affiliation"),
            ("programs", "academic_info_programs_offered"),
            ("programs_offered", "academic_info_programs_offered"),
            ("capacity", "academic_info_capacity"),
        ],
    }
}

pub fn students() -> Schema {
    let mut fields = vec![
        FieldSpec::text("id"),
        FieldSpec::text("name").required(),
        FieldSpec::text("gender"),
        FieldSpec::text("date_of_birth"),
        FieldSpec::text("contact_info.email")
            .required()
            .format(Format::Email),
        FieldSpec::text("contact_info.phone").format(Format::Phone),
        FieldSpec::text("contact_info.address"),
        FieldSpec::text("contact_info.city"),
        FieldSpec::text("contact_info.postal_code").format(Format::PostalCode),
        FieldSpec::text("contact_info.guardian_name"),
        FieldSpec::text("contact_info.guardian_phone").format(Format::Phone),
        FieldSpec::text("academic_info.program").required(),
        FieldSpec::text("academic_info.department"),
        FieldSpec::auto("academic_info.batch_year").default_to(DefaultValue::CurrentYear),
        FieldSpec::auto("academic_info.semester"),
        FieldSpec::text("academic_info.section"),
        FieldSpec::auto("academic_info.admission_year").default_to(DefaultValue::CurrentYear),
        FieldSpec::text("status"),
        FieldSpec::new("is_active", FieldKind::Boolean).default_to(DefaultValue::True),
        FieldSpec::list("tags"),
    ];
    fields.extend(metadata());
    Schema {
        name: "students",
        resource: "students.json",
        write_endpoint: "/api/students/write",
        id_field: "id",
        ids: IdScheme {
            prefix: "STU",
            width: 8,
            floor: 20240001,
        },
        name_field: "name",
        groups: vec!["contact_info", "academic_info"],
        fields,
        unique: vec!["contact_info.email"],
        // The id is the registration number, so only the name can confirm identity.
        identity: vec!["name"],
        aliases: vec![
            ("registration_number", "id"),
            ("registration_no", "id"),
            ("reg_no", "id"),
            ("reg_number", "id"),
            ("student_id", "id"),
            ("student_name", "name"),
            ("full_name", "name"),
            ("dob", "date_of_birth"),
            ("birth_date", "date_of_birth"),
            ("course", "academic_info_program"),
            ("program", "academic_info_program"),
            ("programme", "academic_info_program"),
            ("department", "academic_info_department"),
            ("dept", "academic_info_department"),
            ("batch", "academic_info_batch_year"),
            ("batch_year", "academic_info_batch_year"),
            ("semester", "academic_info_semester"),
            ("sem", "academic_info_semester"),
            ("section", "academic_info_section"),
            ("admission_year", "academic_info_admission_year"),
            ("guardian", "contact_info_guardian_name"),
            ("guardian_name", "contact_info_guardian_name"),
            ("parent_name", "contact_info_guardian_name"),
            ("guardian_phone", "contact_info_guardian_phone"),
            ("parent_phone", "contact_info_guardian_phone"),
        ],
    }
}

pub fn programs() -> Schema {
    let mut fields = vec![
        FieldSpec::text("id"),
        FieldSpec::text("code").required(),
        FieldSpec::text("name").required(),
        FieldSpec::text("department").required(),
        FieldSpec::text("level"),
        FieldSpec::auto("duration_years"),
        FieldSpec::auto("total_semesters"),
        FieldSpec::auto("intake_capacity"),
        FieldSpec::text("description"),
        FieldSpec::text("coordinator.name"),
        FieldSpec::text("coordinator.email").format(Format::Email),
        FieldSpec::list("courses"),
        FieldSpec::new("is_active", FieldKind::Boolean).default_to(DefaultValue::True),
    ];
    fields.extend(metadata());
    Schema {
        name: "programs",
        resource: "program.json",
        write_endpoint: "/api/programs/write",
        id_field: "id",
        ids: IdScheme {
            prefix: "PRG",
            width: 4,
            floor: 1001,
        },
        name_field: "name",
        groups: vec!["coordinator"],
        fields,
        unique: vec!["code"],
        identity: vec!["code", "name"],
        aliases: vec![
            ("program_id", "id"),
            ("program_code", "code"),
            ("course_code", "code"),
            ("program_name", "name"),
            ("course_name", "name"),
            ("dept", "department"),
            ("duration", "duration_years"),
            ("semesters", "total_semesters"),
            ("intake", "intake_capacity"),
            ("capacity", "intake_capacity"),
            ("coordinator", "coordinator_name"),
            ("subjects", "courses"),
        ],
    }
}

pub fn faculty() -> Schema {
    let mut fields = vec![
        FieldSpec::text("id"),
        FieldSpec::text("employee_code").required(),
        FieldSpec::text("name").required(),
        FieldSpec::text("designation"),
        FieldSpec::text("department").required(),
        FieldSpec::text("contact_info.email")
            .required()
            .format(Format::Email),
        FieldSpec::text("contact_info.phone").format(Format::Phone),
        FieldSpec::text("contact_info.office"),
        FieldSpec::text("academic_info.qualification"),
        FieldSpec::list("academic_info.specialization"),
        FieldSpec::auto("academic_info.experience_years"),
        FieldSpec::auto("academic_info.joining_year").default_to(DefaultValue::CurrentYear),
        FieldSpec::list("subjects"),
        FieldSpec::auto("is_available_for_guidance"),
    ];
    fields.extend(metadata());
    Schema {
        name: "faculty",
        resource: "faculty.json",
        write_endpoint: "/api/faculty/write",
        id_field: "id",
        ids: IdScheme {
            prefix: "FAC",
            width: 4,
            floor: 1001,
        },
        name_field: "name",
        groups: vec!["contact_info", "academic_info"],
        fields,
        unique: vec!["employee_code", "contact_info.email"],
        identity: vec!["employee_code", "name"],
        aliases: vec![
            ("faculty_id", "id"),
            ("employee_id", "employee_code"),
            ("emp_code", "employee_code"),
            ("staff_id", "employee_code"),
            ("faculty_name", "name"),
            ("title", "designation"),
            ("dept", "department"),
            ("office", "contact_info_office"),
            ("cabin", "contact_info_office"),
            ("qualification", "academic_info_qualification"),
            ("specialization", "academic_info_specialization"),
            ("experience", "academic_info_experience_years"),
            ("experience_years", "academic_info_experience_years"),
            ("joining_year", "academic_info_joining_year"),
            ("year_of_joining", "academic_info_joining_year"),
            ("available_for_guidance", "is_available_for_guidance"),
        ],
    }
}

pub fn all() -> Vec<Schema> {
    vec![entities(), students(), programs(), faculty()]
}

/// Looks a collection up by name, singular name or resource stem
/// (`students`, `student`, `entity`).
pub fn by_name(name: &str) -> Option<Schema> {
    let n = name.trim().to_ascii_lowercase();
    all().into_iter().find(|s| {
        s.name == n
            || s.name.trim_end_matches('s') == n
            || s.resource.trim_end_matches(".json") == n
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    #[test]
    fn lookup_accepts_resource_stems() {
        assert_eq!(by_name("entity").map(|s| s.name), Some("entities"));
        assert_eq!(by_name("Student").map(|s| s.name), Some("students"));
        assert_eq!(by_name("program").map(|s| s.name), Some("programs"));
        assert_eq!(by_name("faculty").map(|s| s.name), Some("faculty"));
        assert!(by_name("lessons").is_none());
    }

    #[test]
    fn aliases_point_at_declared_columns() {
        for schema in all() {
            let columns = schema.columns();
            for (_, target) in &schema.aliases {
                let known = columns.iter().any(|c| c == target)
                    || schema.groups.iter().any(|g| target.starts_with(g));
                assert!(known, "{}: alias target {} unknown", schema.name, target);
            }
        }
    }

    #[test]
    fn auto_fields_get_numeric_and_boolean_kinds() {
        let f = faculty();
        assert_eq!(
            f.fields.iter().find(|x| x.path == "academic_info.experience_years").map(|x| x.kind),
            Some(FieldKind::Integer)
        );
        assert_eq!(
            f.fields.iter().find(|x| x.path == "is_available_for_guidance").map(|x| x.kind),
            Some(FieldKind::Boolean)
        );
    }
}
