//! Sender → constituent resolution under graded confidence.
//!
//! Rules are applied in strict precedence, first match wins:
//!
//! 1. **exact**: exactly one constituent owns an email contact equal to the
//!    sender address (case-insensitive). Confidence 1.0.
//! 2. **multiple**: several constituents satisfy the fuzzy predicate, or
//!    several share the sender address. The caller must force a choice.
//! 3. **fuzzy**: exactly one constituent satisfies the fuzzy predicate.
//!    Confidence is below 1.0; near misses are offered as alternatives.
//! 4. **none**: nobody matches. Extracted contact fields are returned so a
//!    new constituent can be pre-filled.
//!
//! The fuzzy score is `ceiling * (wn * name + wa * address) / (wn + wa)`,
//! where `name` is the share of name tokens in common (over the longer of the
//! two names) and `address` is 1.0 on a postcode match, otherwise the share
//! of address tokens in common. Ordering is by score, then by constituent id,
//! so results never depend on pool order.

use std::{
  cmp::Ordering,
  collections::{BTreeMap, BTreeSet},
};

use casework_core::{
  constituent::{Constituent, Contact},
  message::Message,
};
use serde::Serialize;
use strum::Display;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  config::ResolverConfig,
  extract::{ExtractedContact, normalize_postcode},
  normalize::{tokenize, words},
};

/// Courtesy titles that say nothing about who a person is.
const HONORIFICS: &[&str] =
  &["mr", "mrs", "ms", "miss", "mx", "dr", "prof", "sir", "dame", "cllr", "rev"];

// ─── Types ───────────────────────────────────────────────────────────────────

/// The identity a message claims to come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sender {
  pub email: String,
  pub name:  Option<String>,
}

impl Sender {
  pub fn of(message: &Message) -> Self {
    Self {
      email: message.sender_email.clone(),
      name:  message.sender_name.clone(),
    }
  }
}

/// Which signals contributed to a candidate's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MatchSignals {
  pub email:           bool,
  pub name_overlap:    f64,
  pub postcode:        bool,
  pub address_overlap: f64,
}

/// A constituent offered as the sender, with a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
  pub constituent_id: Uuid,
  pub full_name:      String,
  pub confidence:     f64,
  pub signals:        MatchSignals,
}

/// The confidence tier of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
  Exact,
  Fuzzy,
  Multiple,
  None,
}

/// Outcome of [`ConstituentResolver::resolve`]. Every variant is a valid
/// terminal state; only `Exact` needs no human confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConstituentMatch {
  Exact {
    candidate: Candidate,
  },
  Fuzzy {
    candidate:    Candidate,
    alternatives: Vec<Candidate>,
  },
  Multiple {
    candidates: Vec<Candidate>,
  },
  None {
    extracted: ExtractedContact,
  },
}

impl ConstituentMatch {
  pub fn status(&self) -> MatchStatus {
    match self {
      Self::Exact { .. } => MatchStatus::Exact,
      Self::Fuzzy { .. } => MatchStatus::Fuzzy,
      Self::Multiple { .. } => MatchStatus::Multiple,
      Self::None { .. } => MatchStatus::None,
    }
  }

  /// The ranked candidates the caller chooses between. For `Fuzzy` this is
  /// the match only; alternatives are reached through the variant.
  pub fn candidates(&self) -> &[Candidate] {
    match self {
      Self::Exact { candidate } | Self::Fuzzy { candidate, .. } => {
        std::slice::from_ref(candidate)
      }
      Self::Multiple { candidates } => candidates,
      Self::None { .. } => &[],
    }
  }

  /// The single constituent to link without asking, if there is one.
  pub fn confirmed(&self) -> Option<Uuid> {
    match self {
      Self::Exact { candidate } => Some(candidate.constituent_id),
      Self::Fuzzy { .. } | Self::Multiple { .. } | Self::None { .. } => None,
    }
  }

  /// The highest-ranked candidate, if any.
  pub fn best(&self) -> Option<&Candidate> { self.candidates().first() }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves a sender to a constituent. Stateless apart from configuration.
#[derive(Debug, Clone, Default)]
pub struct ConstituentResolver {
  config: ResolverConfig,
}

impl ConstituentResolver {
  pub fn new(config: ResolverConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &ResolverConfig { &self.config }

  /// Resolve `sender` against `pool`.
  ///
  /// `contacts` may include rows for constituents outside `pool`; those are
  /// ignored. `extracted` supplies the address signal and is returned as-is
  /// when nothing matches.
  pub fn resolve(
    &self,
    sender: &Sender,
    extracted: &ExtractedContact,
    pool: &[Constituent],
    contacts: &[Contact],
  ) -> Result<ConstituentMatch> {
    let email = sender.email.trim().to_lowercase();
    let sender_name = sender.name.as_deref().unwrap_or("").trim();
    if email.is_empty() && sender_name.is_empty() {
      return Err(Error::InvalidSender);
    }

    // Id-ordered and de-duplicated, so ties resolve the same way every call.
    let people: BTreeMap<Uuid, &Constituent> =
      pool.iter().map(|c| (c.constituent_id, c)).collect();
    let mut by_owner: BTreeMap<Uuid, Vec<&Contact>> = BTreeMap::new();
    for contact in contacts {
      if !people.contains_key(&contact.constituent_id) {
        continue;
      }
      if contact.value.trim().is_empty() {
        return Err(Error::MalformedContact(contact.contact_id));
      }
      by_owner.entry(contact.constituent_id).or_default().push(contact);
    }

    let sender_tokens = name_tokens(sender_name);
    let mut scored: Vec<Candidate> = people
      .values()
      .map(|person| {
        let owned = by_owner
          .get(&person.constituent_id)
          .map(Vec::as_slice)
          .unwrap_or_default();
        self.score(person, owned, &email, &sender_tokens, extracted)
      })
      .collect();
    scored.sort_by(rank);

    let result = self.classify(scored, extracted);
    debug!(
      status = %result.status(),
      candidates = result.candidates().len(),
      "resolved sender {email:?}"
    );
    Ok(result)
  }

  fn classify(
    &self,
    scored: Vec<Candidate>,
    extracted: &ExtractedContact,
  ) -> ConstituentMatch {
    let (mut email_hits, rest): (Vec<Candidate>, Vec<Candidate>) =
      scored.into_iter().partition(|c| c.signals.email);

    match email_hits.len() {
      0 => {}
      1 => {
        let mut candidate = email_hits.remove(0);
        candidate.confidence = 1.0;
        return ConstituentMatch::Exact { candidate };
      }
      _ => {
        let candidates = email_hits
          .into_iter()
          .map(|mut c| {
            c.confidence = 1.0;
            c
          })
          .collect();
        return ConstituentMatch::Multiple { candidates };
      }
    }

    let (mut matched, near): (Vec<Candidate>, Vec<Candidate>) =
      rest.into_iter().partition(|c| self.satisfies(&c.signals));

    match matched.len() {
      0 => ConstituentMatch::None { extracted: extracted.clone() },
      1 => {
        let alternatives = near
          .into_iter()
          .filter(|c| c.confidence > 0.0)
          .take(self.config.max_alternatives)
          .collect();
        ConstituentMatch::Fuzzy {
          candidate: matched.remove(0),
          alternatives,
        }
      }
      _ => ConstituentMatch::Multiple { candidates: matched },
    }
  }

  /// The fuzzy predicate.
  fn satisfies(&self, s: &MatchSignals) -> bool {
    s.name_overlap >= self.config.min_name_overlap
      || s.postcode
      || s.address_overlap >= self.config.min_address_overlap
  }

  fn score(
    &self,
    person: &Constituent,
    contacts: &[&Contact],
    email: &str,
    sender_tokens: &BTreeSet<String>,
    extracted: &ExtractedContact,
  ) -> Candidate {
    let email_match = !email.is_empty()
      && contacts
        .iter()
        .any(|c| c.is_email() && c.value.trim().to_lowercase() == email);

    let name_overlap = overlap(sender_tokens, &name_tokens(&person.full_name));

    let addresses: Vec<&&Contact> =
      contacts.iter().filter(|c| c.is_address()).collect();
    let postcode = extracted.postcode.as_deref().is_some_and(|pc| {
      addresses
        .iter()
        .any(|a| normalize_postcode(&a.value).as_deref() == Some(pc))
    });
    let address_overlap = match &extracted.address {
      Some(addr) => {
        let wanted: BTreeSet<String> = tokenize(addr).into_iter().collect();
        addresses
          .iter()
          .map(|a| {
            overlap(&wanted, &tokenize(&a.value).into_iter().collect::<BTreeSet<_>>())
          })
          .fold(0.0, f64::max)
      }
      None => 0.0,
    };

    let signals = MatchSignals {
      email: email_match,
      name_overlap,
      postcode,
      address_overlap,
    };
    Candidate {
      constituent_id: person.constituent_id,
      full_name: person.full_name.clone(),
      confidence: self.fuzzy_score(&signals),
      signals,
    }
  }

  fn fuzzy_score(&self, s: &MatchSignals) -> f64 {
    let cfg = &self.config;
    let address = if s.postcode { 1.0 } else { s.address_overlap };
    let total = cfg.name_weight + cfg.address_weight;
    let raw = (cfg.name_weight * s.name_overlap + cfg.address_weight * address)
      / total;
    (raw * cfg.fuzzy_ceiling).clamp(0.0, cfg.fuzzy_ceiling)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn name_tokens(name: &str) -> BTreeSet<String> {
  words(name)
    .filter(|w| w.chars().count() >= 2 && !HONORIFICS.contains(&w.as_str()))
    .collect()
}

/// `|a ∩ b| / max(|a|, |b|)`, or 0 when either side is empty.
fn overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
  let longest = a.len().max(b.len());
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }
  a.intersection(b).count() as f64 / longest as f64
}

/// Descending confidence, then ascending constituent id.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
  b.confidence
    .total_cmp(&a.confidence)
    .then_with(|| a.constituent_id.cmp(&b.constituent_id))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use casework_core::constituent::ContactKind;
  use chrono::{TimeZone, Utc};

  use super::*;

  fn person(name: &str) -> Constituent {
    Constituent {
      constituent_id: Uuid::new_v4(),
      full_name:      name.into(),
      created_at:     Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
    }
  }

  fn sender(email: &str, name: Option<&str>) -> Sender {
    Sender { email: email.into(), name: name.map(str::to_owned) }
  }

  fn resolver() -> ConstituentResolver {
    ConstituentResolver::new(ResolverConfig::default()).unwrap()
  }

  #[test]
  fn single_email_owner_is_exact() {
    let jane = person("Jane Smith");
    let other = person("Bob Jones");
    let contacts = vec![
      Contact::new(jane.constituent_id, ContactKind::Email, "Jane@Example.com"),
      Contact::new(other.constituent_id, ContactKind::Email, "bob@example.com"),
    ];

    let result = resolver()
      .resolve(
        &sender("jane@example.com", None),
        &ExtractedContact::default(),
        &[jane.clone(), other],
        &contacts,
      )
      .unwrap();

    assert_eq!(result.status(), MatchStatus::Exact);
    assert_eq!(result.candidates().len(), 1);
    assert_eq!(result.candidates()[0].confidence, 1.0);
    assert_eq!(result.confirmed(), Some(jane.constituent_id));
  }

  #[test]
  fn exact_beats_fuzzy_name_matches() {
    let jane = person("Jane Smith");
    let namesake = person("Jane Smith");
    let contacts =
      vec![Contact::new(jane.constituent_id, ContactKind::Email, "js@example.com")];

    let result = resolver()
      .resolve(
        &sender("js@example.com", Some("Jane Smith")),
        &ExtractedContact::default(),
        &[namesake, jane.clone()],
        &contacts,
      )
      .unwrap();
    assert_eq!(result.confirmed(), Some(jane.constituent_id));
  }

  #[test]
  fn shared_email_is_multiple() {
    let a = person("Pat Lee");
    let b = person("Sam Lee");
    let contacts = vec![
      Contact::new(a.constituent_id, ContactKind::Email, "lees@example.com"),
      Contact::new(b.constituent_id, ContactKind::Email, "lees@example.com"),
    ];

    let result = resolver()
      .resolve(
        &sender("lees@example.com", None),
        &ExtractedContact::default(),
        &[a, b],
        &contacts,
      )
      .unwrap();
    assert_eq!(result.status(), MatchStatus::Multiple);
    assert!(result.candidates().iter().all(|c| c.confidence == 1.0));
  }

  #[test]
  fn two_name_matches_are_multiple_and_stable() {
    let a = person("Jane Smith");
    let b = person("Jane A Smith");
    let c = person("Bob Jones");
    let forward = vec![a.clone(), b.clone(), c.clone()];
    let backward = vec![c, b, a];
    let s = sender("new@example.com", Some("Jane Smith"));
    let none = ExtractedContact::default();

    let first = resolver().resolve(&s, &none, &forward, &[]).unwrap();
    let second = resolver().resolve(&s, &none, &backward, &[]).unwrap();

    assert_eq!(first.status(), MatchStatus::Multiple);
    assert!(first.candidates().len() >= 2);
    assert_eq!(first, second);
    let scores: Vec<f64> =
      first.candidates().iter().map(|c| c.confidence).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
  }

  #[test]
  fn equal_scores_are_ordered_by_id() {
    let a = person("Chris Taylor");
    let b = person("Chris Taylor");
    let result = resolver()
      .resolve(
        &sender("ct@example.com", Some("Chris Taylor")),
        &ExtractedContact::default(),
        &[a.clone(), b.clone()],
        &[],
      )
      .unwrap();
    let ids: Vec<Uuid> =
      result.candidates().iter().map(|c| c.constituent_id).collect();
    let mut sorted = vec![a.constituent_id, b.constituent_id];
    sorted.sort();
    assert_eq!(ids, sorted);
  }

  #[test]
  fn single_name_match_is_fuzzy_with_alternatives() {
    let jane = person("Dr Jane Smith");
    let john = person("John Smith");
    let bob = person("Bob Jones");

    let result = resolver()
      .resolve(
        &sender("j.smith@example.net", Some("Jane Smith")),
        &ExtractedContact::default(),
        &[jane.clone(), john.clone(), bob],
        &[],
      )
      .unwrap();

    let ConstituentMatch::Fuzzy { candidate, alternatives } = &result else {
      panic!("expected fuzzy, got {:?}", result.status());
    };
    assert_eq!(candidate.constituent_id, jane.constituent_id);
    assert!(candidate.confidence < 1.0);
    assert!(candidate.confidence > 0.0);
    assert_eq!(alternatives.len(), 1);
    assert_eq!(alternatives[0].constituent_id, john.constituent_id);
  }

  #[test]
  fn postcode_alone_satisfies_fuzzy() {
    let resident = person("A. N. Other");
    let contacts = vec![Contact::new(
      resident.constituent_id,
      ContactKind::Address,
      "4 Mill Lane, Otley LS21 1AA",
    )];
    let extracted = ExtractedContact {
      postcode: Some("LS21 1AA".into()),
      ..Default::default()
    };

    let result = resolver()
      .resolve(
        &sender("someone@example.com", None),
        &extracted,
        &[resident.clone()],
        &contacts,
      )
      .unwrap();
    assert_eq!(result.status(), MatchStatus::Fuzzy);
    let best = result.best().unwrap();
    assert!(best.signals.postcode);
    assert!(best.confidence < 1.0);
  }

  #[test]
  fn no_match_returns_extracted_fields() {
    let extracted = ExtractedContact {
      name: Some("Zed Quinn".into()),
      email: Some("zed@example.com".into()),
      ..Default::default()
    };
    let result = resolver()
      .resolve(
        &sender("zed@example.com", Some("Zed Quinn")),
        &extracted,
        &[person("Bob Jones")],
        &[],
      )
      .unwrap();
    assert!(!extracted.is_empty());
    assert_eq!(result, ConstituentMatch::None { extracted });
    assert!(result.candidates().is_empty());
  }

  #[test]
  fn address_fragment_alone_satisfies_fuzzy() {
    let resident = person("A. N. Other");
    let contacts = vec![Contact::new(
      resident.constituent_id,
      ContactKind::Address,
      "4 Mill Lane, Otley, Yorkshire",
    )];
    let extracted = ExtractedContact {
      address: Some("4 Mill Lane, Otley".into()),
      ..Default::default()
    };

    let result = resolver()
      .resolve(
        &sender("someone@example.com", None),
        &extracted,
        &[resident.clone()],
        &contacts,
      )
      .unwrap();
    assert_eq!(result.status(), MatchStatus::Fuzzy);
    let best = result.best().unwrap();
    assert_eq!(best.constituent_id, resident.constituent_id);
    assert!(!best.signals.postcode);
    assert!(best.signals.address_overlap >= 0.6);
    assert!(best.confidence < 1.0);
  }

  #[test]
  fn non_ascii_email_matches_case_insensitively() {
    let zoe = person("Zoë Adams");
    let contacts =
      vec![Contact::new(zoe.constituent_id, ContactKind::Email, "ZOË@example.com")];

    for address in ["ZOË@example.com", "zoë@example.com"] {
      let result = resolver()
        .resolve(
          &sender(address, None),
          &ExtractedContact::default(),
          &[zoe.clone()],
          &contacts,
        )
        .unwrap();
      assert_eq!(result.confirmed(), Some(zoe.constituent_id), "{address}");
    }
  }

  #[test]
  fn blank_sender_is_rejected() {
    let err = resolver()
      .resolve(&sender("  ", Some("")), &ExtractedContact::default(), &[], &[])
      .unwrap_err();
    assert!(matches!(err, Error::InvalidSender));
  }

  #[test]
  fn blank_contact_value_is_rejected() {
    let p = person("Jane Smith");
    let bad = Contact::new(p.constituent_id, ContactKind::Email, " ");
    let err = resolver()
      .resolve(
        &sender("jane@example.com", None),
        &ExtractedContact::default(),
        &[p],
        &[bad.clone()],
      )
      .unwrap_err();
    assert!(matches!(err, Error::MalformedContact(id) if id == bad.contact_id));
  }

  #[test]
  fn contacts_outside_pool_are_ignored() {
    let stranger = Uuid::new_v4();
    let contacts =
      vec![Contact::new(stranger, ContactKind::Email, "jane@example.com")];
    let result = resolver()
      .resolve(
        &sender("jane@example.com", None),
        &ExtractedContact::default(),
        &[],
        &contacts,
      )
      .unwrap();
    assert_eq!(result.status(), MatchStatus::None);
  }

  #[test]
  fn blank_contact_outside_pool_does_not_block_resolution() {
    let jane = person("Jane Smith");
    let contacts = vec![
      Contact::new(jane.constituent_id, ContactKind::Email, "jane@example.com"),
      Contact::new(Uuid::new_v4(), ContactKind::Phone, "  "),
    ];
    let result = resolver()
      .resolve(
        &sender("jane@example.com", None),
        &ExtractedContact::default(),
        &[jane.clone()],
        &contacts,
      )
      .unwrap();
    assert_eq!(result.status(), MatchStatus::Exact);
    assert_eq!(result.confirmed(), Some(jane.constituent_id));
  }
}
