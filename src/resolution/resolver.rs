use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::errors::{ContactGraphError, Result};
use crate::redact::fingerprint_opt;
use crate::types::*;

/// Reconciles an `(email, phone number)` pair against the contact graph.
///
/// The resolver holds no state of its own; every decision is made from rows
/// read inside the transaction that also carries its writes.
pub struct IdentityResolver<'a> {
    db: &'a Database,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Finds or extends the identity cluster for the given identifiers and
    /// returns its consolidated view.
    ///
    /// Outcomes, in order of precedence:
    /// 1. nothing matches: a new primary contact is created;
    /// 2. an identifier is new to the matched cluster(s): a secondary linked
    ///    to the oldest primary is created;
    /// 3. the identifiers matched more than one cluster: the clusters are
    ///    merged under their oldest primary.
    ///
    /// The whole call runs in one immediate transaction, so it either
    /// applies completely or not at all. Empty strings count as absent.
    pub fn identify(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<ConsolidatedContact> {
        let email = non_empty(email);
        let phone_number = non_empty(phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(ContactGraphError::validation(
                "At least one of email or phoneNumber must be provided",
            ));
        }

        let tx = self.db.begin_immediate()?;
        let consolidated = self.reconcile(email, phone_number)?;
        tx.commit().map_err(|e| ContactGraphError::Database {
            message: format!("failed to commit transaction: {e}"),
            operation: "identify".to_string(),
        })?;

        Ok(consolidated)
    }

    /// Returns the consolidated view of the cluster containing `contact_id`
    /// without writing anything.
    pub fn lookup(&self, contact_id: i64) -> Result<ConsolidatedContact> {
        let contact = self
            .db
            .get_contact_by_id(contact_id)?
            .ok_or(ContactGraphError::NotFound { id: contact_id })?;

        let primary_ids = owning_primary_ids(std::slice::from_ref(&contact));
        let cluster = self.db.find_cluster(&primary_ids)?;
        build_consolidated_contact(&cluster)
    }

    fn reconcile(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<ConsolidatedContact> {
        let matches = self.db.find_matching_contacts(email, phone_number)?;

        if matches.is_empty() {
            let contact = self
                .db
                .insert_contact(&NewContact::primary(email, phone_number))?;
            info!(
                contact_id = contact.id,
                email = %fingerprint_opt(email),
                phone = %fingerprint_opt(phone_number),
                "created primary contact"
            );
            return build_consolidated_contact(std::slice::from_ref(&contact));
        }

        let primary_ids = owning_primary_ids(&matches);
        let mut cluster = self.db.find_cluster(&primary_ids)?;
        debug!(
            matched = matches.len(),
            primaries = ?primary_ids,
            cluster_size = cluster.len(),
            "expanded matches to cluster"
        );

        if has_new_information(&cluster, email, phone_number) {
            let primary_id = oldest_primary(&cluster)?.id;
            let secondary = self.db.insert_contact(&NewContact::secondary(
                email,
                phone_number,
                primary_id,
            ))?;
            info!(
                contact_id = secondary.id,
                linked_to = primary_id,
                "created secondary contact"
            );
            cluster.push(secondary);
        }

        let primaries: Vec<&Contact> = cluster.iter().filter(|c| c.is_primary()).collect();
        if primaries.len() > 1 {
            let survivor_id = self.merge_primaries(&primaries)?;
            // The in-memory cluster predates the merge; read it back.
            let refreshed = self.db.find_cluster(&[survivor_id])?;
            return build_consolidated_contact(&refreshed);
        }

        build_consolidated_contact(&cluster)
    }

    /// Folds every primary into the oldest one and returns the survivor's id.
    ///
    /// Each demoted primary is rewritten to point at the survivor, then its
    /// former secondaries are re-pointed too, keeping every link one hop
    /// from the root.
    fn merge_primaries(&self, primaries: &[&Contact]) -> Result<i64> {
        let mut ordered: Vec<&Contact> = primaries.to_vec();
        ordered.sort_by_key(|c| c.age_key());

        let survivor = ordered.first().ok_or_else(|| ContactGraphError::CorruptCluster {
            contact_ids: Vec::new(),
        })?;

        for demoted in &ordered[1..] {
            let changed = self.db.demote_contact(demoted.id, survivor.id)?;
            if changed == 0 {
                warn!(contact_id = demoted.id, "primary vanished before demotion");
            }
            let relinked = self.db.relink_contacts(demoted.id, survivor.id)?;
            info!(
                survivor = survivor.id,
                demoted = demoted.id,
                relinked,
                "merged primary contacts"
            );
        }

        Ok(survivor.id)
    }
}

/// Collects the distinct primary ids owning `contacts`, ascending.
pub fn owning_primary_ids(contacts: &[Contact]) -> Vec<i64> {
    contacts
        .iter()
        .filter_map(Contact::owning_primary_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns `true` if either identifier is absent from every cluster member.
pub fn has_new_information(
    cluster: &[Contact],
    email: Option<&str>,
    phone_number: Option<&str>,
) -> bool {
    let new_email = email.is_some_and(|e| !cluster.iter().any(|c| c.email.as_deref() == Some(e)));
    let new_phone = phone_number
        .is_some_and(|p| !cluster.iter().any(|c| c.phone_number.as_deref() == Some(p)));
    new_email || new_phone
}

/// Returns the oldest primary contact of `cluster`.
fn oldest_primary(cluster: &[Contact]) -> Result<&Contact> {
    cluster
        .iter()
        .filter(|c| c.is_primary())
        .min_by_key(|c| c.age_key())
        .ok_or_else(|| corrupt(cluster))
}

fn corrupt(cluster: &[Contact]) -> ContactGraphError {
    let contact_ids: Vec<i64> = cluster.iter().map(|c| c.id).collect();
    warn!(?contact_ids, "cluster has no primary contact");
    ContactGraphError::CorruptCluster { contact_ids }
}

/// Builds the consolidated view of one cluster.
///
/// `cluster` is expected in `created_at` order. Emails and phone numbers are
/// de-duplicated with the primary's own value first and the rest in
/// first-seen order; secondary ids keep cluster order.
pub fn build_consolidated_contact(cluster: &[Contact]) -> Result<ConsolidatedContact> {
    let primary = oldest_primary(cluster)?;

    let emails = primary_first(
        primary.email.as_deref(),
        cluster.iter().filter_map(|c| c.email.as_deref()),
    );
    let phone_numbers = primary_first(
        primary.phone_number.as_deref(),
        cluster.iter().filter_map(|c| c.phone_number.as_deref()),
    );
    let secondary_contact_ids = cluster
        .iter()
        .filter(|c| c.link_precedence == LinkPrecedence::Secondary)
        .map(|c| c.id)
        .collect();

    Ok(ConsolidatedContact {
        primary_contact_id: primary.id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    })
}

/// Distinct values with `first` (if any) leading, others in iteration order.
fn primary_first<'c>(first: Option<&'c str>, values: impl Iterator<Item = &'c str>) -> Vec<String> {
    let mut out: Vec<String> = first.map(|v| vec![v.to_string()]).unwrap_or_default();
    for value in values {
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: i64, email: Option<&str>, phone: Option<&str>, linked: Option<i64>) -> Contact {
        Contact {
            id,
            phone_number: phone.map(str::to_string),
            email: email.map(str::to_string),
            linked_id: linked,
            link_precedence: if linked.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at: id * 10,
            updated_at: id * 10,
            deleted_at: None,
        }
    }

    #[test]
    fn test_consolidated_primary_values_lead() {
        let cluster = vec![
            contact(1, None, Some("111"), None),
            contact(2, Some("b@x.com"), Some("111"), Some(1)),
            contact(3, Some("a@x.com"), Some("222"), Some(1)),
        ];

        let view = build_consolidated_contact(&cluster).unwrap();
        assert_eq!(view.primary_contact_id, 1);
        assert_eq!(view.emails, vec!["b@x.com", "a@x.com"]);
        assert_eq!(view.phone_numbers, vec!["111", "222"]);
        assert_eq!(view.secondary_contact_ids, vec![2, 3]);
    }

    #[test]
    fn test_consolidated_primary_value_moves_to_front() {
        // A primary can be younger in iteration order than a secondary only
        // through a merge refresh; its values still lead.
        let cluster = vec![
            contact(2, Some("s@x.com"), None, Some(5)),
            contact(5, Some("p@x.com"), None, None),
        ];
        let view = build_consolidated_contact(&cluster).unwrap();
        assert_eq!(view.emails, vec!["p@x.com", "s@x.com"]);
    }

    #[test]
    fn test_consolidated_without_primary_is_corrupt() {
        let cluster = vec![contact(2, Some("s@x.com"), None, Some(1))];
        let err = build_consolidated_contact(&cluster).unwrap_err();
        assert!(matches!(err, ContactGraphError::CorruptCluster { contact_ids } if contact_ids == vec![2]));
    }

    #[test]
    fn test_owning_primary_ids_distinct() {
        let contacts = vec![
            contact(4, Some("a@x.com"), None, Some(1)),
            contact(1, Some("a@x.com"), None, None),
            contact(7, None, Some("222"), Some(3)),
        ];
        assert_eq!(owning_primary_ids(&contacts), vec![1, 3]);
    }

    #[test]
    fn test_has_new_information() {
        let cluster = vec![
            contact(1, Some("a@x.com"), Some("111"), None),
            contact(2, Some("b@x.com"), None, Some(1)),
        ];
        assert!(!has_new_information(&cluster, Some("b@x.com"), Some("111")));
        assert!(!has_new_information(&cluster, Some("a@x.com"), None));
        assert!(has_new_information(&cluster, Some("c@x.com"), Some("111")));
        assert!(has_new_information(&cluster, None, Some("222")));
    }
}
