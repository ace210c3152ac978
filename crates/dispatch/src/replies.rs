//! Canned user-facing replies and the human-handoff trigger.

/// Phrase that escalates a conversation to a human agent.
pub const HANDOFF_TRIGGER: &str = "@agente";

/// Reply for non-text content kinds.
pub const MEDIA_NOT_SUPPORTED: &str = "Lo siento, soy una IA y por el momento no soy capaz de entender Audios, Imágenes, Videos, Documentos o Stickers. Por favor, ¿Podrías explicarme en texto? Muchas gracias 😊";

/// Apology sent when the backend returns the not-understood sentinel.
pub const NOT_UNDERSTOOD: &str = "Lo siento, no te he entendido. 😔\n¿Podrías explicármelo de nuevo con otras palabras? 🤗";

/// Data-request template sent when a conversation is handed to a human.
pub const HANDOFF_TEMPLATE: &str = "¡Perfecto! En la brevedad un agente se pondrá en contacto con usted.\n\nPor favor, ¿Podría solicitarme los siguientes datos?\n- Nombre y apellido\n- Email\n- Producto en el que está interesado\n- Presupuesto estimado.\n\n¡Muchas Gracias!";

/// Case-insensitive substring check for the handoff trigger.
#[must_use]
pub fn contains_handoff_trigger(body: &str) -> bool {
    body.to_lowercase().contains(HANDOFF_TRIGGER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_case_insensitive() {
        assert!(contains_handoff_trigger("@agente necesito ayuda"));
        assert!(contains_handoff_trigger("Hola @AGENTE"));
        assert!(contains_handoff_trigger("quiero hablar con el @Agente ya"));
    }

    #[test]
    fn plain_text_does_not_trigger() {
        assert!(!contains_handoff_trigger("necesito un agente"));
        assert!(!contains_handoff_trigger("hola"));
    }
}
