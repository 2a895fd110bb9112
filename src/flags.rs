// 🚩 Flag Lifecycle - raising flags on buildings and invalidating them with assessments
//
// A flag is active from the moment it is written. An assessment pointing at it
// through `ies:assessed` makes it historic; nothing ever reactivates a flag.

use crate::models::UserDetails;
use crate::ontology::SubclassIndex;
use crate::query::{parse_iri, InputError};
use crate::sink::GraphUpdate;
use crate::uri::{IES, ISO_8601, NDT, NDT_ONT, RDF};
use chrono::{DateTime, Utc};
use oxrdf::{Literal, NamedNode, Triple};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlagError {
    #[error("URI of flagged entity must be provided")]
    MissingTarget,

    #[error("assessmentTypeOverride must be a subclass of ndt_ont:AssessToBeFalse")]
    NotAnInvalidation,

    #[error(transparent)]
    Input(#[from] InputError),
}

// ============================================================================
// VOCABULARY
// ============================================================================

fn ies(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", IES, local))
}

fn rdf_type() -> NamedNode {
    NamedNode::new_unchecked(format!("{}type", RDF))
}

/// Base class of every flag invalidation
pub fn assess_to_be_false() -> NamedNode {
    NamedNode::new_unchecked(format!("{}AssessToBeFalse", NDT_ONT))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Investigate,
    Visit,
}

impl FlagKind {
    /// `ndt:InterestedInInvestigating` / `ndt:InterestedInVisiting`
    pub fn class(&self) -> NamedNode {
        let local = match self {
            FlagKind::Investigate => "InterestedInInvestigating",
            FlagKind::Visit => "InterestedInVisiting",
        };
        NamedNode::new_unchecked(format!("{}{}", NDT, local))
    }
}

// ============================================================================
// URIS
// ============================================================================

/// `{stub}{uuid}`
pub fn mint_uri(data_stub: &str, id: Uuid) -> Result<NamedNode, InputError> {
    parse_iri(&format!("{}{}", data_stub, id))
}

/// Deterministic person URI; ids that are not IRI-safe are percent-encoded
pub fn person_uri(data_stub: &str, user_id: &str) -> Result<NamedNode, InputError> {
    NamedNode::new(format!("{}{}", data_stub, user_id))
        .or_else(|_| NamedNode::new(format!("{}{}", data_stub, urlencoding::encode(user_id))))
        .map_err(|_| InputError::Iri(format!("{}{}", data_stub, user_id)))
}

/// `http://iso.org/iso8601#2020-01-01T00:00:00`
pub fn period_iri(at: DateTime<Utc>) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", ISO_8601, at.format("%Y-%m-%dT%H:%M:%S")))
}

// ============================================================================
// COMPOSITION
// ============================================================================

/// Person node plus the name parts history queries read back
pub struct Person {
    pub uri: NamedNode,
    pub triples: Vec<Triple>,
}

pub fn person_triples(data_stub: &str, user: &UserDetails) -> Result<Person, InputError> {
    let uri = person_uri(data_stub, &user.user_id)?;
    let suffixed = |suffix: &str| NamedNode::new_unchecked(format!("{}{}", uri.as_str(), suffix));
    let name = suffixed("_NAME");
    let surname_node = suffixed("_SURNAME");
    let given_node = suffixed("_GIVENNAME");

    let mut tokens = user.username.split_whitespace();
    let given = tokens.next().unwrap_or_default().to_string();
    let surname = tokens.collect::<Vec<_>>().join(" ");
    let full_name = user.username.split_whitespace().collect::<Vec<_>>().join(" ");

    let triples = vec![
        Triple::new(uri.clone(), rdf_type(), ies("Person")),
        Triple::new(uri.clone(), ies("hasName"), name.clone()),
        Triple::new(name.clone(), rdf_type(), ies("PersonName")),
        Triple::new(name.clone(), ies("representationValue"), Literal::new_simple_literal(full_name)),
        Triple::new(surname_node.clone(), rdf_type(), ies("Surname")),
        Triple::new(surname_node.clone(), ies("inRepresentation"), name.clone()),
        Triple::new(surname_node, ies("representationValue"), Literal::new_simple_literal(surname)),
        Triple::new(given_node.clone(), rdf_type(), ies("GivenName")),
        Triple::new(given_node.clone(), ies("inRepresentation"), name),
        Triple::new(given_node, ies("representationValue"), Literal::new_simple_literal(given)),
    ];

    Ok(Person { uri, triples })
}

/// Resolve the target of a flag request; CURIEs must already be lengthened
pub fn flag_target(uri: Option<&str>) -> Result<NamedNode, FlagError> {
    match uri.map(str::trim) {
        Some(uri) if !uri.is_empty() => Ok(parse_iri(uri)?),
        _ => Err(FlagError::MissingTarget),
    }
}

/// Triples raising a flag of `kind` on `target`
pub fn flag_update(
    data_stub: &str,
    kind: FlagKind,
    target: &NamedNode,
    user: &UserDetails,
    flag_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(NamedNode, GraphUpdate), InputError> {
    let flag = mint_uri(data_stub, flag_id)?;
    let person = person_triples(data_stub, user)?;

    let mut update = GraphUpdate::new();
    update.push(Triple::new(flag.clone(), ies("interestedIn"), target.clone()));
    update.push(Triple::new(flag.clone(), ies("isStateOf"), person.uri));
    update.extend(person.triples);
    update.push(Triple::new(flag.clone(), ies("inPeriod"), period_iri(now)));
    update.push(Triple::new(flag.clone(), rdf_type(), kind.class()));

    Ok((flag, update))
}

/// The override must be the base invalidation class or one of its subclasses
pub fn check_assessment_type(
    requested: &NamedNode,
    base: &NamedNode,
    subclasses: &SubclassIndex,
) -> Result<(), FlagError> {
    if requested == base || subclasses.contains(requested.as_str()) {
        Ok(())
    } else {
        Err(FlagError::NotAnInvalidation)
    }
}

/// Triples recording an assessment that invalidates `flag`
pub fn invalidation_update(
    data_stub: &str,
    flag: &NamedNode,
    assessment_type: &NamedNode,
    user: &UserDetails,
    assessment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(NamedNode, GraphUpdate), InputError> {
    let assessment = mint_uri(data_stub, assessment_id)?;
    let assessor = person_triples(data_stub, user)?;

    let mut update = GraphUpdate::new();
    update.push(Triple::new(assessment.clone(), rdf_type(), assessment_type.clone()));
    update.push(Triple::new(assessment.clone(), ies("assessor"), assessor.uri));
    update.extend(assessor.triples);
    update.push(Triple::new(assessment.clone(), ies("assessed"), flag.clone()));
    update.push(Triple::new(assessment.clone(), ies("inPeriod"), period_iri(now)));

    Ok((assessment, update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::{Binding, SparqlResults, Term};
    use crate::uri::PrefixTable;
    use chrono::TimeZone;

    const STUB: &str = "http://ndtp.co.uk/data#";

    fn user() -> UserDetails {
        UserDetails {
            username: "Test User1".to_string(),
            user_id: "1234-5678-99ab-cdef".to_string(),
            email: None,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap()
    }

    fn lines(update: &GraphUpdate) -> Vec<String> {
        update.to_ntriples().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_person_triples() {
        let person = person_triples(STUB, &user()).unwrap();
        let rendered: Vec<String> = person.triples.iter().map(|t| t.to_string()).collect();

        assert_eq!(person.uri.as_str(), "http://ndtp.co.uk/data#1234-5678-99ab-cdef");
        assert!(rendered.contains(
            &"<http://ndtp.co.uk/data#1234-5678-99ab-cdef_GIVENNAME> <http://informationexchangestandard.org/ont/ies#representationValue> \"Test\"".to_string()
        ));
        assert!(rendered.contains(
            &"<http://ndtp.co.uk/data#1234-5678-99ab-cdef_SURNAME> <http://informationexchangestandard.org/ont/ies#representationValue> \"User1\"".to_string()
        ));
        assert!(rendered.contains(
            &"<http://ndtp.co.uk/data#1234-5678-99ab-cdef_NAME> <http://informationexchangestandard.org/ont/ies#representationValue> \"Test User1\"".to_string()
        ));
    }

    #[test]
    fn test_single_word_name_has_empty_surname() {
        let mut single = user();
        single.username = "Prince".to_string();
        let person = person_triples(STUB, &single).unwrap();
        let rendered: Vec<String> = person.triples.iter().map(|t| t.to_string()).collect();

        assert!(rendered.iter().any(|t| t.contains("_SURNAME>") && t.ends_with("\"\"")));
    }

    #[test]
    fn test_unsafe_user_id_is_encoded() {
        let uri = person_uri(STUB, "jane doe<1>").unwrap();
        assert_eq!(uri.as_str(), "http://ndtp.co.uk/data#jane%20doe%3C1%3E");
    }

    #[test]
    fn test_flag_update() {
        let target = parse_iri("http://ndtp.co.uk/data#StructureUnitState_1").unwrap();
        let id = Uuid::nil();
        let (flag, update) = flag_update(STUB, FlagKind::Visit, &target, &user(), id, noon()).unwrap();

        assert_eq!(flag.as_str(), "http://ndtp.co.uk/data#00000000-0000-0000-0000-000000000000");
        let lines = lines(&update);
        assert_eq!(lines.len(), 14);
        assert_eq!(
            lines[0],
            format!(
                "<{}> <http://informationexchangestandard.org/ont/ies#interestedIn> <http://ndtp.co.uk/data#StructureUnitState_1> .",
                flag.as_str()
            )
        );
        assert!(lines.contains(&format!(
            "<{}> <http://informationexchangestandard.org/ont/ies#inPeriod> <http://iso.org/iso8601#2020-01-01T12:00:00> .",
            flag.as_str()
        )));
        assert!(lines.last().unwrap().ends_with("<http://nationaldigitaltwin.gov.uk/data#InterestedInVisiting> ."));
    }

    #[test]
    fn test_flag_target() {
        assert_eq!(flag_target(None).unwrap_err(), FlagError::MissingTarget);
        assert_eq!(flag_target(Some("  ")).unwrap_err(), FlagError::MissingTarget);
        assert!(matches!(flag_target(Some("no uri here")), Err(FlagError::Input(_))));
        assert!(flag_target(Some("http://ndtp.co.uk/data#x")).is_ok());
    }

    #[test]
    fn test_check_assessment_type() {
        let base = assess_to_be_false();
        let mut binding = Binding::new();
        binding.insert("sub".to_string(), Term::uri("http://nationaldigitaltwin.gov.uk/ontology#AssessToBeDuplicate"));
        binding.insert("parent".to_string(), Term::uri(base.as_str()));
        let index = SubclassIndex::from_results(&SparqlResults::from_bindings(vec![binding]), &PrefixTable::standard(STUB));

        let duplicate = parse_iri("http://nationaldigitaltwin.gov.uk/ontology#AssessToBeDuplicate").unwrap();
        let other = parse_iri("http://informationexchangestandard.org/ont/ies#Assessment").unwrap();

        assert!(check_assessment_type(&base, &base, &SubclassIndex::default()).is_ok());
        assert!(check_assessment_type(&duplicate, &base, &index).is_ok());
        let err = check_assessment_type(&other, &base, &index).unwrap_err();
        assert_eq!(err.to_string(), "assessmentTypeOverride must be a subclass of ndt_ont:AssessToBeFalse");
    }

    #[test]
    fn test_invalidation_update() {
        let flag = parse_iri("http://ndtp.co.uk/data#flag1").unwrap();
        let (assessment, update) =
            invalidation_update(STUB, &flag, &assess_to_be_false(), &user(), Uuid::new_v4(), noon()).unwrap();

        let lines = lines(&update);
        assert_eq!(
            lines[0],
            format!(
                "<{}> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://nationaldigitaltwin.gov.uk/ontology#AssessToBeFalse> .",
                assessment.as_str()
            )
        );
        assert!(lines.contains(&format!(
            "<{}> <http://informationexchangestandard.org/ont/ies#assessed> <http://ndtp.co.uk/data#flag1> .",
            assessment.as_str()
        )));
        assert!(lines.contains(&format!(
            "<{}> <http://informationexchangestandard.org/ont/ies#assessor> <http://ndtp.co.uk/data#1234-5678-99ab-cdef> .",
            assessment.as_str()
        )));
    }
}
