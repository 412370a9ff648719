use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_client;
use super::{Ledger, LedgerError};

impl Ledger {
    pub fn find_client_by_phone(&self, phone: &str) -> Option<Client> {
        let id = *self.phone_index.get(phone)?;
        self.get_client(id)
    }

    pub fn get_client(&self, id: Ulid) -> Option<Client> {
        self.clients.get(&id).map(|c| c.value().clone())
    }

    /// Register a new client. The phone is the natural key: a second client
    /// with the same phone is rejected with `PhoneTaken`.
    pub async fn create_client(
        &self,
        name: &str,
        phone: &str,
        visit_date: NaiveDate,
    ) -> Result<Client, LedgerError> {
        validate_client(name, phone)?;
        let _guard = self.client_lock.lock().await;
        self.insert_client_locked(name, phone, visit_date).await
    }

    /// Record a visit: the client's visit date moves, the stored name does not.
    pub async fn update_visit_date(&self, id: Ulid, visit_date: NaiveDate) -> Result<(), LedgerError> {
        if !self.clients.contains_key(&id) {
            return Err(LedgerError::NotFound(id));
        }
        self.persist_and_apply(None, &Event::ClientVisited { id, visit_date })
            .await
    }

    /// Find-or-create by phone in one step: an existing client gets its visit
    /// date updated, an unseen phone becomes a new client.
    pub async fn record_visit(
        &self,
        name: &str,
        phone: &str,
        visit_date: NaiveDate,
    ) -> Result<Client, LedgerError> {
        validate_client(name, phone)?;
        let _guard = self.client_lock.lock().await;
        match self.find_client_by_phone(phone) {
            Some(mut client) => {
                self.update_visit_date(client.id, visit_date).await?;
                client.visit_date = visit_date;
                Ok(client)
            }
            None => self.insert_client_locked(name, phone, visit_date).await,
        }
    }

    async fn insert_client_locked(
        &self,
        name: &str,
        phone: &str,
        visit_date: NaiveDate,
    ) -> Result<Client, LedgerError> {
        if self.phone_index.contains_key(phone) {
            return Err(LedgerError::PhoneTaken(phone.to_string()));
        }
        if self.clients.len() >= MAX_CLIENTS {
            return Err(LedgerError::LimitExceeded("too many clients"));
        }
        let client = Client {
            id: Ulid::new(),
            name: name.to_string(),
            phone: phone.to_string(),
            visit_date,
        };
        self.persist_and_apply(
            None,
            &Event::ClientCreated {
                client: client.clone(),
            },
        )
        .await?;
        Ok(client)
    }
}
