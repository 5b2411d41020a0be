/// Property-based tests using proptest
/// Tests invariants of the merge policy and input validation
use proptest::prelude::*;
use rust_people_api::enrichment::{merge, EnrichmentResult};
use rust_people_api::models::{
    is_country_code, Gender, NewPerson, PersonQuery, UpdatePersonRequest, AGE_MAX, AGE_MIN,
};

fn gender_strategy() -> impl Strategy<Value = Gender> {
    prop_oneof![
        Just(Gender::Male),
        Just(Gender::Female),
        Just(Gender::Other)
    ]
}

fn person_strategy() -> impl Strategy<Value = NewPerson> {
    (
        "[A-Za-z]{2,12}",
        "[A-Za-z]{2,12}",
        proptest::option::of(0u32..=150u32),
        proptest::option::of(gender_strategy()),
        proptest::option::of("[A-Z]{2}| {0,2}"),
    )
        .prop_map(|(name, surname, age, gender, nationality)| NewPerson {
            name,
            surname,
            patronymic: None,
            gender,
            age,
            nationality,
        })
}

fn enrichment_strategy() -> impl Strategy<Value = EnrichmentResult> {
    (
        proptest::option::of(AGE_MIN..=AGE_MAX),
        proptest::option::of(gender_strategy()),
        proptest::option::of("[A-Z]{2}"),
    )
        .prop_map(|(age, gender, nationality)| EnrichmentResult {
            age,
            gender,
            nationality,
        })
}

// Property: merging the same enrichment twice changes nothing the second time
proptest! {
    #[test]
    fn merge_is_idempotent(person in person_strategy(), enrichment in enrichment_strategy()) {
        let once = merge(person, &enrichment);
        let twice = merge(once.clone(), &enrichment);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_with_empty_result_is_identity(person in person_strategy()) {
        let merged = merge(person.clone(), &EnrichmentResult::default());
        // Unset markers (zero age, blank nationality) collapse to None.
        prop_assert_eq!(&merged.name, &person.name);
        prop_assert_eq!(merged.gender, person.gender);
        if let Some(age) = person.age.filter(|a| *a != 0) {
            prop_assert_eq!(merged.age, Some(age));
        }
    }

    #[test]
    fn merge_never_overrides_caller_values(
        person in person_strategy(),
        enrichment in enrichment_strategy()
    ) {
        let merged = merge(person.clone(), &enrichment);

        if let Some(age) = person.age.filter(|a| *a != 0) {
            prop_assert_eq!(merged.age, Some(age));
        }
        if let Some(gender) = person.gender {
            prop_assert_eq!(merged.gender, Some(gender));
        }
        if let Some(nationality) = person.nationality.as_deref().filter(|n| !n.trim().is_empty()) {
            prop_assert_eq!(merged.nationality.as_deref(), Some(nationality));
        }
        prop_assert_eq!(merged.name, person.name);
        prop_assert_eq!(merged.surname, person.surname);
    }

    #[test]
    fn merge_fills_every_gap(enrichment in enrichment_strategy()) {
        let person = NewPerson {
            name: "Ivan".to_string(),
            surname: "Ivanov".to_string(),
            ..Default::default()
        };
        let merged = merge(person, &enrichment);
        prop_assert_eq!(merged.age, enrichment.age);
        prop_assert_eq!(merged.gender, enrichment.gender);
        prop_assert_eq!(merged.nationality, enrichment.nationality);
    }
}

// Property: validation and query parsing should never panic
proptest! {
    #[test]
    fn new_person_validation_never_panics(
        name in "\\PC*",
        surname in "\\PC*",
        age in proptest::option::of(any::<u32>()),
        nationality in proptest::option::of("\\PC*")
    ) {
        let person = NewPerson { name, surname, age, nationality, ..Default::default() };
        let _ = person.validate();
    }

    #[test]
    fn in_range_ages_are_accepted(age in AGE_MIN..=AGE_MAX) {
        let patch = UpdatePersonRequest { age: Some(age), ..Default::default() };
        prop_assert!(patch.validate().is_ok());
    }

    #[test]
    fn out_of_range_ages_are_rejected(age in (AGE_MAX + 1)..=u32::MAX) {
        let patch = UpdatePersonRequest { age: Some(age), ..Default::default() };
        prop_assert!(patch.validate().is_err());
    }

    #[test]
    fn country_code_check_never_panics(code in "\\PC*") {
        let valid = is_country_code(&code);
        if valid {
            prop_assert_eq!(code.len(), 2);
        }
    }

    #[test]
    fn pagination_is_always_sane(limit in "\\PC{0,6}", offset in "\\PC{0,6}") {
        let query = PersonQuery {
            limit: Some(limit),
            offset: Some(offset),
            ..Default::default()
        };
        let (_, page) = query.into_parts();
        prop_assert!(page.limit >= 1);
        prop_assert!(page.offset >= 0);
    }
}
