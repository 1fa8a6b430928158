use crate::db::{encode, Database};
use crate::error::{StoreError, StoreResult};
use crate::models::Person;
use crate::schema::PEOPLE;

impl Database {
    // --- Contact operations ---

    pub fn create_person(&self, person: &Person) -> StoreResult<i64> {
        let mut person = person.clone();
        person.id = None;
        self.kv().add(PEOPLE, encode(&person)?)
    }

    pub fn get_person(&self, id: i64) -> StoreResult<Option<Person>> {
        self.fetch(PEOPLE, id)
    }

    pub fn update_person(&self, person: &Person) -> StoreResult<()> {
        let id = person
            .id
            .ok_or_else(|| StoreError::constraint(PEOPLE, "update requires an id"))?;
        self.fetch_existing::<Person>(PEOPLE, id)?;
        self.kv().put(PEOPLE, encode(person)?)?;
        Ok(())
    }

    pub fn delete_person(&self, id: i64) -> StoreResult<()> {
        if self.kv().delete(PEOPLE, id)? {
            Ok(())
        } else {
            Err(StoreError::not_found(PEOPLE, id))
        }
    }

    pub fn list_people(&self) -> StoreResult<Vec<Person>> {
        self.fetch_all(PEOPLE)
    }

    /// Contacts whose free-text company matches `company`, ignoring case.
    pub fn find_people_by_company(&self, company: &str) -> StoreResult<Vec<Person>> {
        let wanted = company.trim().to_lowercase();
        Ok(self
            .list_people()?
            .into_iter()
            .filter(|person| {
                person
                    .company_name
                    .as_deref()
                    .is_some_and(|name| name.trim().to_lowercase() == wanted)
            })
            .collect())
    }
}
