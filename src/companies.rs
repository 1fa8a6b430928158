use crate::db::{decode, encode, non_blank, Database};
use crate::error::{StoreError, StoreResult};
use crate::kv::{KeyRange, ScanDirection};
use crate::models::Company;
use crate::schema::COMPANIES;

impl Database {
    // --- Company operations ---

    /// Inserts a company and returns its id. Names are unique; a duplicate
    /// fails with `ConstraintViolation` and nothing is written.
    pub fn create_company(&self, company: &Company) -> StoreResult<i64> {
        let mut company = company.clone();
        company.id = None;
        normalize(&mut company)?;
        self.kv().add(COMPANIES, encode(&company)?)
    }

    pub fn get_company(&self, id: i64) -> StoreResult<Option<Company>> {
        self.fetch(COMPANIES, id)
    }

    /// Replaces the stored record with `company`. Jobs refer to companies by
    /// id, so a rename needs nothing else.
    pub fn update_company(&self, company: &Company) -> StoreResult<()> {
        let id = company
            .id
            .ok_or_else(|| StoreError::constraint(COMPANIES, "update requires an id"))?;
        self.fetch_existing::<Company>(COMPANIES, id)?;
        let mut company = company.clone();
        normalize(&mut company)?;
        self.kv().put(COMPANIES, encode(&company)?)?;
        Ok(())
    }

    /// Deletes a company. Jobs pointing at it keep their `company_id`.
    pub fn delete_company(&self, id: i64) -> StoreResult<()> {
        if self.kv().delete(COMPANIES, id)? {
            Ok(())
        } else {
            Err(StoreError::not_found(COMPANIES, id))
        }
    }

    pub fn list_companies(&self) -> StoreResult<Vec<Company>> {
        self.fetch_all(COMPANIES)
    }

    /// Exact-match lookup through the unique name index.
    pub fn find_company_by_name(&self, name: &str) -> StoreResult<Option<Company>> {
        let name = name.trim();
        let mut cursor = self.kv().index_cursor(
            COMPANIES,
            "name",
            KeyRange::only(name),
            ScanDirection::Ascending,
        )?;
        match cursor.next() {
            Some(record) => Ok(Some(decode(COMPANIES, record?)?)),
            None => Ok(None),
        }
    }

    /// Returns the id of the company called `name`, creating it if needed.
    /// The flag is true when a company was created.
    pub fn find_or_create_company(&self, name: &str) -> StoreResult<(i64, bool)> {
        if let Some(existing) = self.find_company_by_name(name)? {
            if let Some(id) = existing.id {
                return Ok((id, false));
            }
        }
        let id = self.create_company(&Company::named(name))?;
        Ok((id, true))
    }
}

pub(crate) fn normalize(company: &mut Company) -> StoreResult<()> {
    let name = non_blank(Some(company.name.as_str()))
        .ok_or_else(|| StoreError::constraint(COMPANIES, "company name is required"))?
        .to_string();
    company.name = name;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_company() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .create_company(&Company {
                name: "  Acme ".into(),
                industry: Some("Widgets".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(id, 1);

        let company = db.get_company(id).unwrap().unwrap();
        assert_eq!(company.id, Some(1));
        assert_eq!(company.name, "Acme");
        assert_eq!(company.industry.as_deref(), Some("Widgets"));
        assert!(db.get_company(99).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_company_name_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_company(&Company::named("Acme")).unwrap();
        let err = db.create_company(&Company::named("Acme")).unwrap_err();
        assert!(err.is_constraint_violation());

        let named_acme = db
            .list_companies()
            .unwrap()
            .into_iter()
            .filter(|c| c.name == "Acme")
            .count();
        assert_eq!(named_acme, 1);
    }

    #[test]
    fn test_company_name_is_required() {
        let db = Database::open_in_memory().unwrap();
        let err = db.create_company(&Company::named("   ")).unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(db.list_companies().unwrap().is_empty());
    }

    #[test]
    fn test_create_ignores_caller_supplied_id() {
        let db = Database::open_in_memory().unwrap();
        db.create_company(&Company::named("First")).unwrap();
        let id = db
            .create_company(&Company {
                id: Some(1),
                name: "Second".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(db.get_company(1).unwrap().unwrap().name, "First");
    }

    #[test]
    fn test_update_company_replaces_record() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_company(&Company::named("Acme")).unwrap();
        let mut company = db.get_company(id).unwrap().unwrap();
        company.website = Some("https://acme.test".into());
        db.update_company(&company).unwrap();

        let stored = db.get_company(id).unwrap().unwrap();
        assert_eq!(stored.website.as_deref(), Some("https://acme.test"));
    }

    #[test]
    fn test_update_to_taken_name_fails() {
        let db = Database::open_in_memory().unwrap();
        db.create_company(&Company::named("Acme")).unwrap();
        let id = db.create_company(&Company::named("Globex")).unwrap();
        let mut globex = db.get_company(id).unwrap().unwrap();
        globex.name = "Acme".into();
        assert!(db.update_company(&globex).unwrap_err().is_constraint_violation());
        assert_eq!(db.get_company(id).unwrap().unwrap().name, "Globex");
    }

    #[test]
    fn test_update_and_delete_missing_company() {
        let db = Database::open_in_memory().unwrap();
        let ghost = Company {
            id: Some(5),
            name: "Ghost".into(),
            ..Default::default()
        };
        assert!(db.update_company(&ghost).unwrap_err().is_not_found());
        assert!(db.delete_company(5).unwrap_err().is_not_found());
    }

    #[test]
    fn test_find_company_by_name_is_exact() {
        let db = Database::open_in_memory().unwrap();
        db.create_company(&Company::named("Acme")).unwrap();
        db.create_company(&Company::named("Acme Labs")).unwrap();

        let found = db.find_company_by_name("Acme").unwrap().unwrap();
        assert_eq!(found.id, Some(1));
        assert!(db.find_company_by_name("acme").unwrap().is_none());
        assert!(db.find_company_by_name("Initech").unwrap().is_none());
    }

    #[test]
    fn test_find_or_create_company() {
        let db = Database::open_in_memory().unwrap();
        let (id, created) = db.find_or_create_company("Acme").unwrap();
        assert!(created);
        let (again, created_again) = db.find_or_create_company("Acme").unwrap();
        assert_eq!(again, id);
        assert!(!created_again);
        assert_eq!(db.list_companies().unwrap().len(), 1);
    }
}
