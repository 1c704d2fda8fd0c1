//! Minimal valid bodies for the target's write endpoints

use newsteps_qa_common::Credentials;
use serde_json::{json, Value};

/// Identity used when no session user is at hand
pub fn default_person() -> Credentials {
    Credentials {
        email: "test@example.com".to_string(),
        password: String::new(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone: "555-123-4567".to_string(),
    }
}

pub fn address() -> Value {
    json!({
        "street": "123 Test St",
        "city": "San Francisco",
        "state": "CA",
        "zipCode": "94102",
        "country": "USA",
    })
}

pub fn contact(person: &Credentials) -> Value {
    json!({
        "firstName": person.first_name,
        "lastName": person.last_name,
        "email": person.email,
        "subject": "API Test",
        "message": "Testing contact API",
    })
}

pub fn shoe_donation(person: &Credentials) -> Value {
    json!({
        "donorInfo": {
            "firstName": person.first_name,
            "lastName": person.last_name,
            "email": person.email,
            "phone": person.phone,
            "address": address(),
        },
        "numberOfShoes": 2,
        "condition": "good",
        "description": "Testing shoe donation API",
    })
}

pub fn money_donation(person: &Credentials) -> Value {
    json!({
        "firstName": person.first_name,
        "lastName": person.last_name,
        "email": person.email,
        "phone": person.phone,
        "amount": 25,
        "message": "Testing money donation API",
    })
}

pub fn volunteer(person: &Credentials) -> Value {
    json!({
        "firstName": person.first_name,
        "lastName": person.last_name,
        "email": person.email,
        "phone": person.phone,
        "location": "San Francisco, CA",
        "availability": "Weekends",
        "interests": ["events"],
        "experience": "Testing volunteer API",
        "message": "Testing volunteer API",
    })
}

/// One pair of `shoe_id`, picked up in person
pub fn request(person: &Credentials, shoe_id: &Value) -> Value {
    json!({
        "items": [{ "shoeId": shoe_id, "quantity": 1 }],
        "shippingInfo": {
            "firstName": person.first_name,
            "lastName": person.last_name,
            "email": person.email,
            "phone": person.phone,
            "address": address(),
        },
        "shippingMethod": "pickup",
    })
}
